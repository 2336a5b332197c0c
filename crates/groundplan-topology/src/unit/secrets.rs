//! Secret store tier
//!
//! Holds the cluster's secrets and certificates. Its API port is reachable
//! by other members and by the CIDR blocks of its own subnets — an
//! asynchronous lookup, so the group's materialization waits for it. The
//! role carries the storage, KV-table and unseal-key grants the store needs
//! beyond fleet membership.

use super::{
    PeerRef, SecurityPosture, UnitBuilder, UnitContext, UnitKind, resolve_peer_ids, standard_tags,
};
use crate::bootstrap::{BootstrapRenderer, scripts};
use crate::identity::{
    COMPUTE_PRINCIPAL, RolePolicy, fleet_membership_statement, identity_lookup_statements,
    kv_table_statement, storage_backend_statement, unseal_key_statement,
};
use crate::image::{ImageSelector, select_image};
use crate::network::subnet_cidrs;
use crate::scaling::{FixedPool, PoolSpec, RootVolume};
use async_trait::async_trait;
use groundplan_core::{GroupBuilder, Result, TrustRule};
use serde::Serialize;

pub const CLUSTER_PORT: i64 = 8201;
pub const API_PORT: i64 = 8200;

/// Names of the store's backing resources, derived from the unit name so
/// role statements and bootstrap agree without further lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretStoreBackend {
    pub storage_bucket: String,
    pub kv_table: String,
    pub unseal_key: String,
}

impl SecretStoreBackend {
    pub fn for_unit(name: &str) -> Self {
        Self {
            storage_bucket: format!("{name}-storage"),
            kv_table: format!("{name}-kv"),
            unseal_key: format!("{name}-unseal"),
        }
    }
}

pub struct SecretCluster {
    name: String,
    size: u32,
    instance_type: String,
    consumes: Vec<PeerRef>,
    backend: SecretStoreBackend,
}

impl SecretCluster {
    pub fn new(
        name: impl Into<String>,
        size: u32,
        instance_type: impl Into<String>,
        consumes: Vec<PeerRef>,
    ) -> Self {
        let name = name.into();
        let backend = SecretStoreBackend::for_unit(&name);
        Self {
            name,
            size,
            instance_type: instance_type.into(),
            consumes,
            backend,
        }
    }

    pub fn backend(&self) -> &SecretStoreBackend {
        &self.backend
    }
}

#[async_trait]
impl UnitBuilder for SecretCluster {
    fn kind(&self) -> UnitKind {
        UnitKind::SecretStore
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn consumes(&self) -> Vec<PeerRef> {
        self.consumes.clone()
    }

    fn build_role(&self, _ctx: &UnitContext) -> Result<RolePolicy> {
        let mut statements = vec![
            fleet_membership_statement(),
            storage_backend_statement(&self.backend.storage_bucket),
            kv_table_statement(&self.backend.kv_table),
            unseal_key_statement(&self.backend.unseal_key),
        ];
        statements.extend(identity_lookup_statements());

        RolePolicy::new(&self.name, COMPUTE_PRINCIPAL, statements)
    }

    fn build_security_posture(&self, ctx: &UnitContext) -> Result<SecurityPosture> {
        let vpc_cidrs = subnet_cidrs(ctx.subnets.clone(), ctx.network.private_subnets.clone());

        let group = GroupBuilder::new(&self.name, ctx.network.vpc.clone())
            .description("secret store")
            .ingress(TrustRule::tcp(CLUSTER_PORT, "cluster")?)
            .ingress(TrustRule::tcp(API_PORT, "api")?)
            .ingress(TrustRule::tcp_from_vpc_cidrs(
                API_PORT,
                vpc_cidrs,
                "api from vpc",
            )?)
            .egress(TrustRule::all_to_anywhere())
            .build();

        Ok(SecurityPosture::new(vec![group]))
    }

    async fn build_pool(
        &self,
        ctx: &UnitContext,
        role: &RolePolicy,
        posture: &SecurityPosture,
    ) -> Result<PoolSpec> {
        let peers = resolve_peer_ids(ctx).await?;
        let mut renderer = BootstrapRenderer::new(role.name(), &peers);
        renderer
            .variable("storage_bucket", &self.backend.storage_bucket)
            .variable("kv_table", &self.backend.kv_table)
            .variable("unseal_key", &self.backend.unseal_key)
            .variable("region", &ctx.config.region);
        let user_data = renderer.render(scripts::SECRET_STORE)?;

        let mut security_groups = vec![posture.groups[0].id()];
        security_groups.extend(ctx.peer_groups.iter().cloned());

        Ok(PoolSpec {
            name: self.name.clone(),
            pool: FixedPool::of(self.size),
            image: select_image(ctx.images.clone(), ImageSelector::owned("vault-.*")),
            instance_type: self.instance_type.clone(),
            role_id: role.role_id(),
            security_groups,
            subnets: ctx.network.private_subnets.clone(),
            user_data,
            key_pair: ctx.config.key_pair.clone(),
            associate_public_ip: false,
            root_volume: RootVolume::default(),
            target_groups: Vec::new(),
            tags: standard_tags(ctx, &self.name),
        })
    }
}
