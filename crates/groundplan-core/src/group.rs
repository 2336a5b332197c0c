//! Security group builder
//!
//! Turns a set of trust rules — some referencing not-yet-resolved peer
//! groups or pending CIDR lookups — into a named, directional rule set. The
//! group's own identifier is itself deferred: it resolves only once the
//! enclosing network handle and every deferred rule source have resolved,
//! which is what guarantees a group referencing a peer is never materialized
//! before that peer's identifier exists.

use crate::deferred::Deferred;
use crate::error::Result;
use crate::id::{GroupId, VpcId};
use crate::rule::{Protocol, RuleSource, TrustRule};
use futures_util::future::try_join_all;
use serde::Serialize;
use tracing::debug;

/// Builder for a [`SecurityGroupSpec`].
pub struct GroupBuilder {
    name: String,
    description: String,
    vpc: Deferred<VpcId>,
    ingress: Vec<TrustRule>,
    egress: Vec<TrustRule>,
}

impl GroupBuilder {
    pub fn new(name: impl Into<String>, vpc: Deferred<VpcId>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            vpc,
            ingress: Vec::new(),
            egress: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn ingress(mut self, rule: TrustRule) -> Self {
        self.ingress.push(rule);
        self
    }

    pub fn ingress_rules(mut self, rules: impl IntoIterator<Item = TrustRule>) -> Self {
        self.ingress.extend(rules);
        self
    }

    pub fn egress(mut self, rule: TrustRule) -> Self {
        self.egress.push(rule);
        self
    }

    /// Canonicalize the rule sets and produce the immutable spec.
    ///
    /// Rules are sorted by their dedup key and duplicates dropped, so the
    /// effective permission set is independent of declaration order and
    /// duplicate declarations are idempotent.
    pub fn build(self) -> SecurityGroupSpec {
        let name = self.name;
        let description = self.description;
        let ingress = canonicalize(self.ingress);
        let egress = canonicalize(self.egress);

        let materialized = {
            let name = name.clone();
            let description = description.clone();
            let vpc = self.vpc.clone();
            let ingress = ingress.clone();
            let egress = egress.clone();
            Deferred::lazy(format!("sg:{name}"), async move {
                let vpc = vpc.resolve().await?;
                let ingress = resolve_rules(&ingress).await?;
                let egress = resolve_rules(&egress).await?;
                debug!(group = %name, rules = ingress.len(), "materialized security group");
                Ok(MaterializedGroup {
                    id: GroupId::new(format!("sg-{name}")),
                    name,
                    description,
                    vpc,
                    ingress,
                    egress,
                })
            })
        };

        SecurityGroupSpec {
            name,
            description,
            vpc: self.vpc,
            ingress,
            egress,
            materialized,
        }
    }
}

fn canonicalize(mut rules: Vec<TrustRule>) -> Vec<TrustRule> {
    rules.sort_by(|a, b| a.dedup_key().cmp(&b.dedup_key()));
    rules.dedup_by(|a, b| a.dedup_key() == b.dedup_key());
    rules
}

async fn resolve_rules(rules: &[TrustRule]) -> Result<Vec<ResolvedRule>> {
    try_join_all(rules.iter().map(ResolvedRule::from_rule)).await
}

/// A named, directional rule set whose identifier resolves on demand.
///
/// Produced once, then immutable; later specs consume the identifier as a
/// read-only [`Deferred<GroupId>`] handle.
#[derive(Debug, Clone)]
pub struct SecurityGroupSpec {
    name: String,
    description: String,
    vpc: Deferred<VpcId>,
    ingress: Vec<TrustRule>,
    egress: Vec<TrustRule>,
    materialized: Deferred<MaterializedGroup>,
}

impl SecurityGroupSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn vpc(&self) -> &Deferred<VpcId> {
        &self.vpc
    }

    pub fn ingress(&self) -> &[TrustRule] {
        &self.ingress
    }

    pub fn egress(&self) -> &[TrustRule] {
        &self.egress
    }

    /// Handle to this group's identifier, for consumption by later specs.
    pub fn id(&self) -> Deferred<GroupId> {
        self.materialized.map(|group| group.id)
    }

    /// Resolve every deferred input and produce the concrete rule set.
    pub async fn materialize(&self) -> Result<MaterializedGroup> {
        self.materialized.resolve().await
    }
}

/// A fully-resolved security group: the request-graph node handed to the
/// provisioning engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterializedGroup {
    pub id: GroupId,
    pub name: String,
    pub description: String,
    pub vpc: VpcId,
    pub ingress: Vec<ResolvedRule>,
    pub egress: Vec<ResolvedRule>,
}

/// A trust rule with every source made concrete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRule {
    pub protocol: Protocol,
    pub from_port: u16,
    pub to_port: u16,
    /// Traffic from other members of the same group.
    pub self_source: bool,
    pub security_groups: Vec<GroupId>,
    pub cidr_blocks: Vec<String>,
    pub description: String,
}

impl ResolvedRule {
    async fn from_rule(rule: &TrustRule) -> Result<Self> {
        let mut resolved = Self {
            protocol: rule.protocol,
            from_port: rule.from_port,
            to_port: rule.to_port,
            self_source: false,
            security_groups: Vec::new(),
            cidr_blocks: Vec::new(),
            description: rule.description.clone(),
        };

        match &rule.source {
            RuleSource::SelfGroup => resolved.self_source = true,
            RuleSource::PeerGroup(group) => {
                resolved.security_groups.push(group.resolve().await?);
            }
            RuleSource::Cidr(cidr) => resolved.cidr_blocks.push(cidr.clone()),
            RuleSource::VpcCidrs(cidrs) => resolved.cidr_blocks = cidrs.resolve().await?,
        }

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlanError;

    fn vpc() -> Deferred<VpcId> {
        Deferred::ready("vpc:test", VpcId::new("vpc-0011"))
    }

    #[tokio::test]
    async fn duplicate_rules_are_idempotent() {
        let group = GroupBuilder::new("discovery", vpc())
            .ingress(TrustRule::tcp(8301, "serf lan").unwrap())
            .ingress(TrustRule::tcp(8301, "serf lan, declared twice").unwrap())
            .build();

        assert_eq!(group.ingress().len(), 1);
        let materialized = group.materialize().await.unwrap();
        assert_eq!(materialized.ingress.len(), 1);
        assert_eq!(materialized.ingress[0].from_port, 8301);
    }

    #[tokio::test]
    async fn rule_order_does_not_change_meaning() {
        let a = GroupBuilder::new("one", vpc())
            .ingress(TrustRule::tcp(8300, "rpc").unwrap())
            .ingress(TrustRule::udp(8301, "serf").unwrap())
            .build();
        let b = GroupBuilder::new("one", vpc())
            .ingress(TrustRule::udp(8301, "serf").unwrap())
            .ingress(TrustRule::tcp(8300, "rpc").unwrap())
            .build();

        assert_eq!(
            a.materialize().await.unwrap().ingress,
            b.materialize().await.unwrap().ingress
        );
    }

    #[tokio::test]
    async fn self_rules_need_no_identifier() {
        let group = GroupBuilder::new("secrets", vpc())
            .ingress(TrustRule::tcp(8201, "cluster").unwrap())
            .build();

        let materialized = group.materialize().await.unwrap();
        assert!(materialized.ingress[0].self_source);
        assert!(materialized.ingress[0].security_groups.is_empty());
        assert_eq!(materialized.id, GroupId::new("sg-secrets"));
    }

    #[tokio::test]
    async fn peer_rules_resolve_the_peer_identifier() {
        let client = GroupBuilder::new("orch-client", vpc()).build();
        let server = GroupBuilder::new("orch-server", vpc())
            .ingress(TrustRule::tcp_from_group(4647, client.id(), "rpc from clients").unwrap())
            .build();

        let materialized = server.materialize().await.unwrap();
        assert_eq!(
            materialized.ingress[0].security_groups,
            vec![GroupId::new("sg-orch-client")]
        );
    }

    #[tokio::test]
    async fn pending_vpc_lookup_defers_materialization() {
        let broken_vpc: Deferred<VpcId> = Deferred::failed(
            "vpc:missing",
            PlanError::unresolved("vpc:missing", "network lookup failed"),
        );
        let group = GroupBuilder::new("secrets", broken_vpc)
            .ingress(TrustRule::tcp(8200, "api").unwrap())
            .build();

        assert!(matches!(
            group.materialize().await.unwrap_err(),
            PlanError::UnresolvedDependency { .. }
        ));
    }

    #[tokio::test]
    async fn failed_cidr_lookup_propagates() {
        let cidrs: Deferred<Vec<String>> = Deferred::failed(
            "cidrs:private",
            PlanError::unresolved("cidrs:private", "subnet lookup failed"),
        );
        let group = GroupBuilder::new("secrets", vpc())
            .ingress(TrustRule::tcp_from_vpc_cidrs(8200, cidrs, "api from vpc").unwrap())
            .build();

        assert!(group.materialize().await.is_err());
        assert!(group.id().resolve().await.is_err());
    }
}
