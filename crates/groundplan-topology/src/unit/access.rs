//! Access host tier
//!
//! The single host operators SSH into. It owns two groups: its own, open on
//! the SSH port to the declared operator networks, and an exported
//! `ssh-target` group that every other tier attaches so the access host —
//! and nothing else — can reach them on SSH.

use super::{
    PeerRef, SecurityPosture, UnitBuilder, UnitContext, UnitKind, resolve_peer_ids, standard_tags,
};
use crate::bootstrap::{BootstrapRenderer, scripts};
use crate::identity::{COMPUTE_PRINCIPAL, RolePolicy, fleet_membership_statement};
use crate::image::{ImageSelector, PUBLIC_BASE_IMAGE_OWNER, select_image};
use crate::scaling::{FixedPool, PoolSpec, RootVolume};
use async_trait::async_trait;
use groundplan_core::{Deferred, GroupBuilder, Result, TrustRule};

pub const SSH_PORT: i64 = 22;

/// Exported handle: the access host's own group.
pub const HANDLE_BASTION: &str = "bastion";
/// Exported handle: membership grants SSH access *from* the access host.
pub const HANDLE_SSH_TARGET: &str = "ssh-target";

pub struct AccessHost {
    name: String,
    instance_type: String,
    connect_from: Vec<String>,
}

impl AccessHost {
    /// `connect_from` lists the operator CIDR blocks allowed to reach the
    /// host on SSH.
    pub fn new(
        name: impl Into<String>,
        instance_type: impl Into<String>,
        connect_from: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            instance_type: instance_type.into(),
            connect_from,
        }
    }
}

#[async_trait]
impl UnitBuilder for AccessHost {
    fn kind(&self) -> UnitKind {
        UnitKind::Access
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn consumes(&self) -> Vec<PeerRef> {
        Vec::new()
    }

    fn build_role(&self, _ctx: &UnitContext) -> Result<RolePolicy> {
        RolePolicy::new(
            &self.name,
            COMPUTE_PRINCIPAL,
            vec![fleet_membership_statement()],
        )
    }

    fn build_security_posture(&self, ctx: &UnitContext) -> Result<SecurityPosture> {
        let mut builder = GroupBuilder::new(&self.name, ctx.network.vpc.clone())
            .description("access host")
            .egress(TrustRule::all_to_anywhere());
        for cidr in &self.connect_from {
            builder = builder.ingress(TrustRule::tcp_from_cidr(SSH_PORT, cidr, "ssh")?);
        }
        let bastion = builder.build();

        let ssh_target = GroupBuilder::new(format!("{}-from-bastion", self.name), ctx.network.vpc.clone())
            .description("ssh from the access host")
            .ingress(TrustRule::tcp_from_group(
                SSH_PORT,
                bastion.id(),
                "ssh from access host",
            )?)
            .build();

        let bastion_id = bastion.id();
        let target_id = ssh_target.id();
        Ok(SecurityPosture::new(vec![bastion, ssh_target])
            .export(HANDLE_BASTION, bastion_id)
            .export(HANDLE_SSH_TARGET, target_id))
    }

    async fn build_pool(
        &self,
        ctx: &UnitContext,
        role: &RolePolicy,
        posture: &SecurityPosture,
    ) -> Result<PoolSpec> {
        let peers = resolve_peer_ids(ctx).await?;
        let user_data = BootstrapRenderer::new(role.name(), &peers).render(scripts::ACCESS)?;

        let selector = ImageSelector::from_owner(
            PUBLIC_BASE_IMAGE_OWNER,
            "ubuntu/images/hvm-ssd/ubuntu-xenial-16.04-amd64-server-.*",
        );

        let mut security_groups = vec![posture.groups[0].id()];
        security_groups.extend(ctx.peer_groups.iter().cloned());

        Ok(PoolSpec {
            name: self.name.clone(),
            pool: FixedPool::of(1),
            image: select_image(ctx.images.clone(), selector),
            instance_type: self.instance_type.clone(),
            role_id: role.role_id(),
            security_groups,
            subnets: ctx.network.public_subnets.clone(),
            user_data,
            key_pair: ctx.config.key_pair.clone(),
            associate_public_ip: true,
            root_volume: RootVolume::default(),
            target_groups: Vec::new(),
            tags: standard_tags(ctx, &self.name),
        })
    }

    fn entry_address(
        &self,
        ctx: &UnitContext,
        posture: &SecurityPosture,
    ) -> Option<Deferred<String>> {
        let address = format!("{}.{}.compute.internal", self.name, ctx.config.region);
        posture
            .exported
            .get(HANDLE_BASTION)
            .map(|group| group.map(move |_| address))
    }
}
