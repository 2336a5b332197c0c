//! Groundplan topology
//!
//! Cluster units and the composer that wires them into a five-tier
//! topology. Each unit owns an identity, a security posture and a
//! fixed-size pool, and exposes deferred handles its siblings consume
//! before the underlying resources exist.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                  Topology Composer                    │
//! │   construction order from declared references         │
//! └──────┬───────────┬──────────┬───────────┬────────────┘
//!        │           │          │           │
//!   ┌────▼───┐ ┌─────▼────┐ ┌───▼────┐ ┌────▼─────────┐
//!   │ access │ │discovery │ │ secret │ │ orchestrator │
//!   │  host  │ │ cluster  │ │ store  │ │ server/client│
//!   └────┬───┘ └─────┬────┘ └───┬────┘ └────┬─────────┘
//!        │           │          │           │
//!        └───────────┴────┬─────┴───────────┘
//!                         │
//!              UnitManifests + TopologyOutputs
//!              (request graph for the engine)
//! ```
//!
//! The provisioning engine that executes the resulting request graph is an
//! external collaborator; this crate stops at fully-resolved manifests and
//! the flat outputs mapping.

pub mod balancer;
pub mod bootstrap;
pub mod compose;
pub mod config;
pub mod identity;
pub mod image;
pub mod network;
pub mod outputs;
pub mod scaling;
pub mod unit;

// Re-exports
pub use balancer::{BalancerManifest, BalancerSpec, ListenerConfig, TargetGroupSpec};
pub use bootstrap::BootstrapRenderer;
pub use compose::{ComposedTopology, StandardTopology, TopologyDeclaration, compose};
pub use config::ProviderConfig;
pub use identity::{Effect, PolicyStatement, RolePolicy};
pub use image::{ImageCatalog, ImageSelector, select_image};
pub use network::{NetworkContext, SubnetCatalog, subnet_cidrs};
pub use outputs::TopologyOutputs;
pub use scaling::{FixedPool, PoolManifest, PoolSpec, RootVolume};
pub use unit::{
    AccessHost, AssembledUnit, DiscoveryCluster, OrchestratorClientCluster,
    OrchestratorServerCluster, PeerRef, SecretCluster, SecurityPosture, UnitBuilder, UnitContext,
    UnitKind, UnitManifest, UnitPhase, assemble,
};
