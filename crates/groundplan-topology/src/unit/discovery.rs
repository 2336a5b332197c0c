//! Service discovery tier
//!
//! The cluster every other tier joins for membership and DNS. The posture
//! is split: an exported `client` group carries the symmetric gossip rules,
//! and the server group accepts the RPC, HTTP and DNS ports only from that
//! client group — never from a blanket self rule that would admit any
//! instance in a catch-all group.

use super::{
    PeerRef, SecurityPosture, UnitBuilder, UnitContext, UnitKind, resolve_peer_ids, standard_tags,
};
use crate::bootstrap::{BootstrapRenderer, scripts};
use crate::identity::{COMPUTE_PRINCIPAL, RolePolicy, fleet_membership_statement};
use crate::image::{ImageSelector, select_image};
use crate::scaling::{FixedPool, PoolSpec, RootVolume};
use async_trait::async_trait;
use groundplan_core::{GroupBuilder, Result, TrustRule};

pub const SERVER_RPC_PORT: i64 = 8300;
pub const CLI_RPC_PORT: i64 = 8400;
pub const SERF_LAN_PORT: i64 = 8301;
pub const SERF_WAN_PORT: i64 = 8302;
pub const HTTP_API_PORT: i64 = 8500;
pub const DNS_PORT: i64 = 8600;

/// Exported handle: membership makes an instance a discovery client.
pub const HANDLE_CLIENT: &str = "client";

pub struct DiscoveryCluster {
    name: String,
    size: u32,
    instance_type: String,
    consumes: Vec<PeerRef>,
}

impl DiscoveryCluster {
    pub fn new(
        name: impl Into<String>,
        size: u32,
        instance_type: impl Into<String>,
        consumes: Vec<PeerRef>,
    ) -> Self {
        Self {
            name: name.into(),
            size,
            instance_type: instance_type.into(),
            consumes,
        }
    }
}

#[async_trait]
impl UnitBuilder for DiscoveryCluster {
    fn kind(&self) -> UnitKind {
        UnitKind::Discovery
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn consumes(&self) -> Vec<PeerRef> {
        self.consumes.clone()
    }

    fn build_role(&self, _ctx: &UnitContext) -> Result<RolePolicy> {
        RolePolicy::new(
            &self.name,
            COMPUTE_PRINCIPAL,
            vec![fleet_membership_statement()],
        )
    }

    fn build_security_posture(&self, ctx: &UnitContext) -> Result<SecurityPosture> {
        let client = GroupBuilder::new(format!("{}-client", self.name), ctx.network.vpc.clone())
            .description("connect to the discovery cluster")
            .ingress(TrustRule::tcp(SERF_LAN_PORT, "serf lan")?)
            .ingress(TrustRule::udp(SERF_LAN_PORT, "serf lan")?)
            .build();

        let server = GroupBuilder::new(format!("{}-server", self.name), ctx.network.vpc.clone())
            .description("discovery server")
            .ingress(TrustRule::tcp_from_group(
                SERVER_RPC_PORT,
                client.id(),
                "server rpc from clients",
            )?)
            .ingress(TrustRule::tcp_from_group(
                CLI_RPC_PORT,
                client.id(),
                "cli rpc from clients",
            )?)
            .ingress(TrustRule::tcp_from_group(
                HTTP_API_PORT,
                client.id(),
                "http api from clients",
            )?)
            .ingress(TrustRule::tcp_from_group(
                DNS_PORT,
                client.id(),
                "dns from clients",
            )?)
            .ingress(TrustRule::udp_from_group(
                DNS_PORT,
                client.id(),
                "dns from clients",
            )?)
            .ingress(TrustRule::tcp(SERF_WAN_PORT, "serf wan")?)
            .ingress(TrustRule::udp(SERF_WAN_PORT, "serf wan")?)
            .egress(TrustRule::all_to_anywhere())
            .build();

        let client_id = client.id();
        Ok(SecurityPosture::new(vec![client, server]).export(HANDLE_CLIENT, client_id))
    }

    async fn build_pool(
        &self,
        ctx: &UnitContext,
        role: &RolePolicy,
        posture: &SecurityPosture,
    ) -> Result<PoolSpec> {
        let peers = resolve_peer_ids(ctx).await?;
        let user_data =
            BootstrapRenderer::new(role.name(), &peers).render(scripts::DISCOVERY_SERVER)?;

        // servers are members of both groups: serf via client, rpc via server
        let mut security_groups: Vec<_> = posture.groups.iter().map(|g| g.id()).collect();
        security_groups.extend(ctx.peer_groups.iter().cloned());

        let mut tags = standard_tags(ctx, &self.name);
        tags.insert("consul-servers".to_string(), "auto-join".to_string());

        Ok(PoolSpec {
            name: self.name.clone(),
            pool: FixedPool::of(self.size),
            image: select_image(ctx.images.clone(), ImageSelector::owned("consul-.*")),
            instance_type: self.instance_type.clone(),
            role_id: role.role_id(),
            security_groups,
            subnets: ctx.network.private_subnets.clone(),
            user_data,
            key_pair: ctx.config.key_pair.clone(),
            associate_public_ip: false,
            root_volume: RootVolume::default(),
            target_groups: Vec::new(),
            tags,
        })
    }
}
