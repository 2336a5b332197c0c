//! Topology composer
//!
//! Orders unit construction so that every declared reference is satisfied
//! by an already-assembled sibling, then materializes the whole graph. The
//! order is a topological sort over the declared references — a reference
//! to an undeclared unit, or a reference cycle, is a construction-time
//! error before any unit is built. Composition is all-or-nothing: the first
//! failed lookup aborts it and no partial topology is observable.

use crate::balancer::ListenerConfig;
use crate::config::ProviderConfig;
use crate::network::{NetworkContext, SubnetCatalog};
use crate::image::ImageCatalog;
use crate::outputs::{self, TopologyOutputs};
use crate::unit::{
    self, AccessHost, AssembledUnit, DiscoveryCluster, OrchestratorClientCluster,
    OrchestratorServerCluster, PeerRef, SecretCluster, UnitBuilder, UnitContext, UnitManifest,
};
use futures_util::future::try_join_all;
use groundplan_core::{PlanError, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// The declared set of units to compose, in any order.
#[derive(Default)]
pub struct TopologyDeclaration {
    units: Vec<Box<dyn UnitBuilder>>,
}

impl TopologyDeclaration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unit(mut self, builder: Box<dyn UnitBuilder>) -> Self {
        self.units.push(builder);
        self
    }

    /// The canonical five-tier wiring: access → discovery → secret store →
    /// orchestrator servers → orchestrator clients, every tier reachable on
    /// SSH only from the access host, every non-access tier joined to
    /// discovery, clients joined to the orchestrator servers.
    pub fn standard(spec: StandardTopology) -> Self {
        let ssh = |unit: &str| PeerRef::new(unit, unit::access::HANDLE_SSH_TARGET);
        let discovery_client =
            || PeerRef::new("discovery", unit::discovery::HANDLE_CLIENT);

        let mut clients = OrchestratorClientCluster::new(
            "orchestrator-client",
            spec.orchestrator_client_size,
            spec.instance_type.as_str(),
            vec![
                ssh("access"),
                discovery_client(),
                PeerRef::new("orchestrator-server", unit::orchestrator::HANDLE_CLIENT),
            ],
        );
        if let Some(listeners) = spec.ingress_listeners {
            clients = clients.with_load_balancer(listeners);
        }

        Self::new()
            .unit(Box::new(AccessHost::new(
                "access",
                spec.instance_type.as_str(),
                spec.access_connect_from,
            )))
            .unit(Box::new(DiscoveryCluster::new(
                "discovery",
                spec.discovery_size,
                spec.instance_type.as_str(),
                vec![ssh("access")],
            )))
            .unit(Box::new(SecretCluster::new(
                "secret-store",
                spec.secret_size,
                spec.instance_type.as_str(),
                vec![ssh("access"), discovery_client()],
            )))
            .unit(Box::new(OrchestratorServerCluster::new(
                "orchestrator-server",
                spec.orchestrator_server_size,
                spec.instance_type.as_str(),
                vec![ssh("access"), discovery_client()],
            )))
            .unit(Box::new(clients))
    }
}

/// Sizing and wiring of the canonical topology.
#[derive(Debug, Clone)]
pub struct StandardTopology {
    pub access_connect_from: Vec<String>,
    pub discovery_size: u32,
    pub secret_size: u32,
    pub orchestrator_server_size: u32,
    pub orchestrator_client_size: u32,
    pub instance_type: String,
    pub ingress_listeners: Option<Vec<ListenerConfig>>,
}

/// The composed, fully-resolved topology.
#[derive(Debug, Clone)]
pub struct ComposedTopology {
    pub manifests: Vec<UnitManifest>,
    pub outputs: TopologyOutputs,
}

/// Compose the declared units into a resolved topology.
pub async fn compose(
    config: &ProviderConfig,
    network: &NetworkContext,
    images: Arc<dyn ImageCatalog>,
    subnets: Arc<dyn SubnetCatalog>,
    declaration: TopologyDeclaration,
) -> Result<ComposedTopology> {
    let order = construction_order(&declaration.units)?;
    info!(units = declaration.units.len(), "composing topology");

    // assemble strictly in dependency order; peers come from the registry
    // of already-assembled siblings only
    let mut registry: BTreeMap<String, AssembledUnit> = BTreeMap::new();
    let mut assembled_order: Vec<String> = Vec::new();
    for index in order {
        let builder = &declaration.units[index];
        let peer_groups = builder
            .consumes()
            .iter()
            .map(|peer| {
                registry
                    .get(&peer.unit)
                    .ok_or_else(|| {
                        PlanError::CyclicOrMissingDependency(format!(
                            "unit '{}' references unit '{}' which is not built yet",
                            builder.name(),
                            peer.unit
                        ))
                    })?
                    .exported(&peer.handle)
                    .ok_or_else(|| {
                        PlanError::CyclicOrMissingDependency(format!(
                            "unit '{}' exports no handle '{}' (needed by '{}')",
                            peer.unit,
                            peer.handle,
                            builder.name()
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let ctx = UnitContext {
            config: config.clone(),
            network: network.clone(),
            images: images.clone(),
            subnets: subnets.clone(),
            peer_groups,
        };

        debug!(unit = %builder.name(), "assembling unit");
        let assembled = unit::assemble(builder.as_ref(), &ctx).await?;
        assembled_order.push(assembled.name.clone());
        registry.insert(assembled.name.clone(), assembled);
    }

    // all-or-nothing: resolve every manifest before exposing anything;
    // the per-unit lookups run concurrently
    let manifests = try_join_all(
        assembled_order
            .iter()
            .map(|name| registry[name].manifest()),
    )
    .await?;

    let mut outputs = TopologyOutputs::new();
    let mut ingress_dns = String::new();
    for name in &assembled_order {
        let assembled = &registry[name];
        outputs.insert(outputs::role_id_key(name), assembled.role.role_id());
        outputs.insert(outputs::pool_name_key(name), assembled.pool.pool_name());

        if let Some(address) = &assembled.entry_address {
            outputs.insert(outputs::ENTRY_ADDRESS, address.resolve().await?);
        }
        if let Some(balancer) = &assembled.posture.balancer {
            ingress_dns = balancer.dns_name().resolve().await?;
        }
    }
    outputs.insert(outputs::INGRESS_DNS_NAME, ingress_dns);

    info!(outputs = outputs.len(), "topology composed");
    Ok(ComposedTopology { manifests, outputs })
}

/// Topological order over the declared references, stable with respect to
/// declaration order.
fn construction_order(units: &[Box<dyn UnitBuilder>]) -> Result<Vec<usize>> {
    let index_of: BTreeMap<&str, usize> = units
        .iter()
        .enumerate()
        .map(|(i, u)| (u.name(), i))
        .collect();

    let mut dependencies: Vec<Vec<usize>> = vec![Vec::new(); units.len()];
    for (i, unit) in units.iter().enumerate() {
        for peer in unit.consumes() {
            let dep = *index_of.get(peer.unit.as_str()).ok_or_else(|| {
                PlanError::CyclicOrMissingDependency(format!(
                    "unit '{}' references undeclared unit '{}'",
                    unit.name(),
                    peer.unit
                ))
            })?;
            dependencies[i].push(dep);
        }
    }

    let mut order = Vec::with_capacity(units.len());
    let mut placed = vec![false; units.len()];
    while order.len() < units.len() {
        let mut progressed = false;
        for i in 0..units.len() {
            if placed[i] {
                continue;
            }
            if dependencies[i].iter().all(|&dep| placed[dep]) {
                placed[i] = true;
                order.push(i);
                progressed = true;
            }
        }
        if !progressed {
            let stuck: Vec<_> = units
                .iter()
                .enumerate()
                .filter(|(i, _)| !placed[*i])
                .map(|(_, u)| u.name().to_string())
                .collect();
            return Err(PlanError::CyclicOrMissingDependency(format!(
                "reference cycle among units: {}",
                stuck.join(", ")
            )));
        }
    }

    Ok(order)
}
