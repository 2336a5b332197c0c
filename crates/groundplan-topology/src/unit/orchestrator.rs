//! Workload orchestration tiers
//!
//! Servers schedule, clients run the workloads. The server posture mirrors
//! the discovery split: an exported `client` group carries the symmetric
//! serf rules and is what client fleets attach to reach the servers; the
//! server group accepts HTTP, RPC and serf only from that client group.
//!
//! The client tier is the ingress tier: it may attach a load balancer, in
//! which case its machine group admits the listener ports from the
//! balancer's group only.

use super::{
    PeerRef, SecurityPosture, UnitBuilder, UnitContext, UnitKind, resolve_peer_ids, standard_tags,
};
use crate::balancer::{BalancerSpec, ListenerConfig};
use crate::bootstrap::{BootstrapRenderer, scripts};
use crate::identity::{COMPUTE_PRINCIPAL, RolePolicy, fleet_membership_statement};
use crate::image::{ImageSelector, select_image};
use crate::scaling::{FixedPool, PoolSpec, RootVolume};
use async_trait::async_trait;
use groundplan_core::{GroupBuilder, Result, TrustRule};

pub const HTTP_PORT: i64 = 4646;
pub const RPC_PORT: i64 = 4647;
pub const SERF_PORT: i64 = 4648;

/// Exported handle: membership makes an instance an orchestrator client.
pub const HANDLE_CLIENT: &str = "client";

pub struct OrchestratorServerCluster {
    name: String,
    size: u32,
    instance_type: String,
    consumes: Vec<PeerRef>,
}

impl OrchestratorServerCluster {
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
impl UnitBuilder for OrchestratorServerCluster {
    fn kind(&self) -> UnitKind {
        UnitKind::OrchestratorServer
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
            .description("connect to the orchestrator cluster")
            .ingress(TrustRule::tcp(SERF_PORT, "serf lan")?)
            .ingress(TrustRule::udp(SERF_PORT, "serf lan")?)
            .build();

        let server = GroupBuilder::new(format!("{}-server", self.name), ctx.network.vpc.clone())
            .description("orchestrator server")
            .ingress(TrustRule::tcp_from_group(
                HTTP_PORT,
                client.id(),
                "http api from clients",
            )?)
            .ingress(TrustRule::tcp_from_group(
                RPC_PORT,
                client.id(),
                "rpc from clients",
            )?)
            .ingress(TrustRule::tcp_from_group(
                SERF_PORT,
                client.id(),
                "serf from clients",
            )?)
            .ingress(TrustRule::udp_from_group(
                SERF_PORT,
                client.id(),
                "serf from clients",
            )?)
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
        let mut renderer = BootstrapRenderer::new(role.name(), &peers);
        renderer.pool_size(self.size);
        let user_data = renderer.render(scripts::ORCHESTRATOR_SERVER)?;

        let mut security_groups: Vec<_> = posture.groups.iter().map(|g| g.id()).collect();
        security_groups.extend(ctx.peer_groups.iter().cloned());

        let mut tags = standard_tags(ctx, &self.name);
        tags.insert("nomad-servers".to_string(), "auto-join".to_string());

        Ok(PoolSpec {
            name: self.name.clone(),
            pool: FixedPool::of(self.size),
            image: select_image(ctx.images.clone(), ImageSelector::owned("nomad-.*")),
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

pub struct OrchestratorClientCluster {
    name: String,
    size: u32,
    instance_type: String,
    consumes: Vec<PeerRef>,
    listeners: Option<Vec<ListenerConfig>>,
}

impl OrchestratorClientCluster {
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
            listeners: None,
        }
    }

    /// Attach an ingress load balancer on the given listeners.
    pub fn with_load_balancer(mut self, listeners: Vec<ListenerConfig>) -> Self {
        self.listeners = Some(listeners);
        self
    }
}

#[async_trait]
impl UnitBuilder for OrchestratorClientCluster {
    fn kind(&self) -> UnitKind {
        UnitKind::OrchestratorClient
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
        // The balancer's group exists before the machine group so the
        // fleet-side rules can reference it.
        let balancer = match &self.listeners {
            Some(listeners) => Some(BalancerSpec::build(
                &self.name,
                &ctx.config.region,
                ctx.network.vpc.clone(),
                ctx.network.public_subnets.clone(),
                listeners.clone(),
            )?),
            None => None,
        };

        let mut builder = GroupBuilder::new(&self.name, ctx.network.vpc.clone())
            .description("orchestrator client")
            .egress(TrustRule::all_to_anywhere());
        if let Some(balancer) = &balancer {
            builder = builder.ingress_rules(balancer.fleet_rules()?);
        }
        let machine = builder.build();

        let mut groups = Vec::new();
        if let Some(balancer) = &balancer {
            groups.push(balancer.group().clone());
        }
        groups.push(machine);

        let mut posture = SecurityPosture::new(groups);
        if let Some(balancer) = balancer {
            posture = posture.balancer(balancer);
        }
        Ok(posture)
    }

    async fn build_pool(
        &self,
        ctx: &UnitContext,
        role: &RolePolicy,
        posture: &SecurityPosture,
    ) -> Result<PoolSpec> {
        let peers = resolve_peer_ids(ctx).await?;
        let user_data =
            BootstrapRenderer::new(role.name(), &peers).render(scripts::ORCHESTRATOR_CLIENT)?;

        // the machine group is always the last one built in the posture
        let machine = posture
            .groups
            .last()
            .map(|g| g.id())
            .into_iter()
            .collect::<Vec<_>>();
        let mut security_groups = machine;
        security_groups.extend(ctx.peer_groups.iter().cloned());

        let target_groups = posture
            .balancer
            .as_ref()
            .map(|b| b.target_groups().iter().map(|t| t.name.clone()).collect())
            .unwrap_or_default();

        Ok(PoolSpec {
            name: self.name.clone(),
            pool: FixedPool::of(self.size),
            image: select_image(ctx.images.clone(), ImageSelector::owned("nomad-.*")),
            instance_type: self.instance_type.clone(),
            role_id: role.role_id(),
            security_groups,
            subnets: ctx.network.private_subnets.clone(),
            user_data,
            key_pair: ctx.config.key_pair.clone(),
            associate_public_ip: false,
            root_volume: RootVolume::default(),
            target_groups,
            tags: standard_tags(ctx, &self.name),
        })
    }
}
