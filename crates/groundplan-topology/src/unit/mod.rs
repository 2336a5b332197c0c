//! Cluster units
//!
//! One deployable tier of the topology: an identity, a security posture,
//! and a fixed-size pool. Tiers implement the [`UnitBuilder`] capability
//! trait and are selected by [`UnitKind`]; there is no inheritance.
//!
//! A unit moves through a strict single-pass state machine while it is
//! assembled: `Declared -> RoleBuilt -> SecurityPostureBuilt ->
//! ScalingSpecBuilt -> OutputsExposed`. The terminal state is what the
//! composer reads.

pub mod access;
pub mod discovery;
pub mod orchestrator;
pub mod secrets;

pub use access::AccessHost;
pub use discovery::DiscoveryCluster;
pub use orchestrator::{OrchestratorClientCluster, OrchestratorServerCluster};
pub use secrets::{SecretCluster, SecretStoreBackend};

use crate::balancer::{BalancerManifest, BalancerSpec};
use crate::config::ProviderConfig;
use crate::identity::RolePolicy;
use crate::image::ImageCatalog;
use crate::network::{NetworkContext, SubnetCatalog};
use crate::scaling::{PoolManifest, PoolSpec};
use async_trait::async_trait;
use futures_util::future::try_join_all;
use groundplan_core::{
    Deferred, GroupId, MaterializedGroup, PlanError, Result, SecurityGroupSpec,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// The tier variants a topology is composed of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnitKind {
    Access,
    Discovery,
    SecretStore,
    OrchestratorServer,
    OrchestratorClient,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnitKind::Access => "access",
            UnitKind::Discovery => "discovery",
            UnitKind::SecretStore => "secret-store",
            UnitKind::OrchestratorServer => "orchestrator-server",
            UnitKind::OrchestratorClient => "orchestrator-client",
        };
        f.write_str(name)
    }
}

/// Assembly states of a unit, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UnitPhase {
    Declared,
    RoleBuilt,
    SecurityPostureBuilt,
    ScalingSpecBuilt,
    OutputsExposed,
}

impl UnitPhase {
    fn next(self) -> Option<UnitPhase> {
        match self {
            UnitPhase::Declared => Some(UnitPhase::RoleBuilt),
            UnitPhase::RoleBuilt => Some(UnitPhase::SecurityPostureBuilt),
            UnitPhase::SecurityPostureBuilt => Some(UnitPhase::ScalingSpecBuilt),
            UnitPhase::ScalingSpecBuilt => Some(UnitPhase::OutputsExposed),
            UnitPhase::OutputsExposed => None,
        }
    }
}

/// Tracks a unit's single-pass progression; out-of-order transitions are
/// ordering violations.
pub struct PhaseTracker {
    unit: String,
    phase: UnitPhase,
}

impl PhaseTracker {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            phase: UnitPhase::Declared,
        }
    }

    pub fn current(&self) -> UnitPhase {
        self.phase
    }

    pub fn advance(&mut self, to: UnitPhase) -> Result<()> {
        if self.phase.next() != Some(to) {
            return Err(PlanError::CyclicOrMissingDependency(format!(
                "unit '{}' cannot move from {:?} to {:?}",
                self.unit, self.phase, to
            )));
        }
        debug!(unit = %self.unit, phase = ?to, "unit phase transition");
        self.phase = to;
        Ok(())
    }
}

/// Reference to an exported handle of a sibling unit, e.g. the discovery
/// tier's `client` group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeerRef {
    pub unit: String,
    pub handle: String,
}

impl PeerRef {
    pub fn new(unit: impl Into<String>, handle: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            handle: handle.into(),
        }
    }
}

/// Everything a unit builder may consult while assembling.
///
/// `peer_groups` holds the already-built sibling handles resolved from the
/// unit's declared references, in declaration order.
#[derive(Clone)]
pub struct UnitContext {
    pub config: ProviderConfig,
    pub network: NetworkContext,
    pub images: Arc<dyn ImageCatalog>,
    pub subnets: Arc<dyn SubnetCatalog>,
    pub peer_groups: Vec<Deferred<GroupId>>,
}

/// A unit's own security groups plus the handles it exports to siblings.
pub struct SecurityPosture {
    pub groups: Vec<SecurityGroupSpec>,
    pub exported: BTreeMap<String, Deferred<GroupId>>,
    pub balancer: Option<BalancerSpec>,
}

impl SecurityPosture {
    pub fn new(groups: Vec<SecurityGroupSpec>) -> Self {
        Self {
            groups,
            exported: BTreeMap::new(),
            balancer: None,
        }
    }

    pub fn export(mut self, handle: impl Into<String>, group: Deferred<GroupId>) -> Self {
        self.exported.insert(handle.into(), group);
        self
    }

    pub fn balancer(mut self, balancer: BalancerSpec) -> Self {
        self.balancer = Some(balancer);
        self
    }
}

/// Capability interface one tier variant implements.
#[async_trait]
pub trait UnitBuilder: Send + Sync {
    fn kind(&self) -> UnitKind;

    fn name(&self) -> &str;

    /// Exported handles of sibling units this unit consumes. The composer
    /// only satisfies these from units assembled earlier in the order.
    fn consumes(&self) -> Vec<PeerRef> {
        Vec::new()
    }

    fn build_role(&self, ctx: &UnitContext) -> Result<RolePolicy>;

    fn build_security_posture(&self, ctx: &UnitContext) -> Result<SecurityPosture>;

    /// Builds the pool spec, rendering the bootstrap script with resolved
    /// substitution values; this is where peer handles are awaited.
    async fn build_pool(
        &self,
        ctx: &UnitContext,
        role: &RolePolicy,
        posture: &SecurityPosture,
    ) -> Result<PoolSpec>;

    /// Externally reachable address, exposed by the access tier only.
    fn entry_address(&self, _ctx: &UnitContext, _posture: &SecurityPosture) -> Option<Deferred<String>> {
        None
    }
}

/// Await the sibling handles a unit was given; bootstrap rendering needs
/// them as concrete identifiers, never pending values.
pub(crate) async fn resolve_peer_ids(ctx: &UnitContext) -> Result<Vec<GroupId>> {
    Deferred::join_all(ctx.peer_groups.clone()).resolve().await
}

/// Base tags plus the unit's `Name`, propagated to every pool member.
pub(crate) fn standard_tags(ctx: &UnitContext, name: &str) -> BTreeMap<String, String> {
    let mut tags = ctx.config.base_tags.clone();
    tags.insert("Name".to_string(), name.to_string());
    tags
}

/// Drive a unit through its assembly states.
pub async fn assemble(builder: &dyn UnitBuilder, ctx: &UnitContext) -> Result<AssembledUnit> {
    let mut phase = PhaseTracker::new(builder.name());

    let role = builder.build_role(ctx)?;
    phase.advance(UnitPhase::RoleBuilt)?;

    let posture = builder.build_security_posture(ctx)?;
    phase.advance(UnitPhase::SecurityPostureBuilt)?;

    let pool = builder.build_pool(ctx, &role, &posture).await?;
    phase.advance(UnitPhase::ScalingSpecBuilt)?;

    let entry_address = builder.entry_address(ctx, &posture);
    phase.advance(UnitPhase::OutputsExposed)?;

    Ok(AssembledUnit {
        kind: builder.kind(),
        name: builder.name().to_string(),
        role,
        posture,
        pool,
        entry_address,
        phase: phase.current(),
    })
}

/// A unit in its terminal state, outputs exposed for the composer.
pub struct AssembledUnit {
    pub kind: UnitKind,
    pub name: String,
    pub role: RolePolicy,
    pub posture: SecurityPosture,
    pub pool: PoolSpec,
    pub entry_address: Option<Deferred<String>>,
    pub phase: UnitPhase,
}

impl AssembledUnit {
    /// Look up an exported handle by name.
    pub fn exported(&self, handle: &str) -> Option<Deferred<GroupId>> {
        self.posture.exported.get(handle).cloned()
    }

    /// Resolve every deferred input into the unit's request-graph node.
    pub async fn manifest(&self) -> Result<UnitManifest> {
        let groups =
            try_join_all(self.posture.groups.iter().map(|group| group.materialize())).await?;
        let pool = self.pool.manifest().await?;
        let balancer = match &self.posture.balancer {
            Some(balancer) => Some(balancer.manifest().await?),
            None => None,
        };

        Ok(UnitManifest {
            name: self.name.clone(),
            kind: self.kind,
            role: self.role.clone(),
            groups,
            pool,
            balancer,
        })
    }
}

/// Fully-resolved unit: the per-tier payload handed to the provisioning
/// engine. Group order follows build order, so any group referenced by a
/// later rule appears before its referrer.
#[derive(Debug, Clone, Serialize)]
pub struct UnitManifest {
    pub name: String,
    pub kind: UnitKind,
    pub role: RolePolicy,
    pub groups: Vec<MaterializedGroup>,
    pub pool: PoolManifest,
    pub balancer: Option<BalancerManifest>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_advance_in_order() {
        let mut tracker = PhaseTracker::new("discovery");
        assert_eq!(tracker.current(), UnitPhase::Declared);
        tracker.advance(UnitPhase::RoleBuilt).unwrap();
        tracker.advance(UnitPhase::SecurityPostureBuilt).unwrap();
        tracker.advance(UnitPhase::ScalingSpecBuilt).unwrap();
        tracker.advance(UnitPhase::OutputsExposed).unwrap();
        assert_eq!(tracker.current(), UnitPhase::OutputsExposed);
    }

    #[test]
    fn skipping_or_reentering_a_phase_is_rejected() {
        let mut tracker = PhaseTracker::new("discovery");
        assert!(matches!(
            tracker.advance(UnitPhase::ScalingSpecBuilt),
            Err(PlanError::CyclicOrMissingDependency(_))
        ));

        tracker.advance(UnitPhase::RoleBuilt).unwrap();
        assert!(tracker.advance(UnitPhase::RoleBuilt).is_err());

        tracker.advance(UnitPhase::SecurityPostureBuilt).unwrap();
        tracker.advance(UnitPhase::ScalingSpecBuilt).unwrap();
        tracker.advance(UnitPhase::OutputsExposed).unwrap();
        // terminal: no further transition exists
        assert!(tracker.advance(UnitPhase::Declared).is_err());
    }
}
