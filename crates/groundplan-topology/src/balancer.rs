//! Ingress load balancer
//!
//! The only way public traffic reaches a fleet. The balancer's own group is
//! open to the world on the configured listener ports; the fleet-side rules
//! it hands out admit traffic solely from that group, so a fleet behind a
//! balancer is never exposed to the open internet directly.

use groundplan_core::{
    Deferred, GroupBuilder, GroupId, Result, SecurityGroupSpec, SubnetId, TrustRule, VpcId,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One listening port on the balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub port: u16,
    pub protocol: String,
    pub certificate: Option<String>,
}

impl ListenerConfig {
    pub fn http(port: u16) -> Self {
        Self {
            port,
            protocol: "HTTP".to_string(),
            certificate: None,
        }
    }

    pub fn https(port: u16, certificate: impl Into<String>) -> Self {
        Self {
            port,
            protocol: "HTTPS".to_string(),
            certificate: Some(certificate.into()),
        }
    }
}

/// One target group, forwarding a listener to fleet instances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetGroupSpec {
    pub name: String,
    pub port: u16,
    pub protocol: String,
    pub target_type: String,
}

/// A declared load balancer: its own group, one target group per listener
/// and a DNS name that resolves once the group materializes.
#[derive(Debug, Clone)]
pub struct BalancerSpec {
    name: String,
    group: SecurityGroupSpec,
    listeners: Vec<ListenerConfig>,
    target_groups: Vec<TargetGroupSpec>,
    public_subnets: Vec<SubnetId>,
    dns: Deferred<String>,
}

impl BalancerSpec {
    pub fn build(
        name: impl Into<String>,
        region: &str,
        vpc: Deferred<VpcId>,
        public_subnets: Vec<SubnetId>,
        listeners: Vec<ListenerConfig>,
    ) -> Result<Self> {
        let name = name.into();

        let mut builder = GroupBuilder::new(format!("{name}-lb"), vpc)
            .description("traffic to the load balancer")
            .egress(TrustRule::all_to_anywhere());
        for listener in &listeners {
            builder = builder.ingress(TrustRule::tcp_from_cidr(
                i64::from(listener.port),
                "0.0.0.0/0",
                format!("{}-{}", listener.port, listener.protocol),
            )?);
        }
        let group = builder.build();

        let target_groups = listeners
            .iter()
            .map(|listener| TargetGroupSpec {
                name: format!("{name}-tg-{}", listener.port),
                port: listener.port,
                protocol: listener.protocol.clone(),
                target_type: "instance".to_string(),
            })
            .collect();

        // The DNS name is only meaningful once the balancer's group exists.
        let dns = {
            let address = format!("{name}.{region}.lb.internal");
            group.id().map(move |_| address)
        };

        debug!(balancer = %name, listeners = listeners.len(), "declared load balancer");

        Ok(Self {
            name,
            group,
            listeners,
            target_groups,
            public_subnets,
            dns,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The balancer's own security group.
    pub fn group(&self) -> &SecurityGroupSpec {
        &self.group
    }

    pub fn listeners(&self) -> &[ListenerConfig] {
        &self.listeners
    }

    pub fn target_groups(&self) -> &[TargetGroupSpec] {
        &self.target_groups
    }

    pub fn public_subnets(&self) -> &[SubnetId] {
        &self.public_subnets
    }

    pub fn dns_name(&self) -> Deferred<String> {
        self.dns.clone()
    }

    /// The rules a fleet's machine group adds so the balancer — and only
    /// the balancer — can reach it on the listener ports.
    pub fn fleet_rules(&self) -> Result<Vec<TrustRule>> {
        self.listeners
            .iter()
            .map(|listener| {
                TrustRule::tcp_from_group(
                    i64::from(listener.port),
                    self.group.id(),
                    format!("{} from load balancer", listener.port),
                )
            })
            .collect()
    }

    pub async fn manifest(&self) -> Result<BalancerManifest> {
        Ok(BalancerManifest {
            name: self.name.clone(),
            group: self.group.id().resolve().await?,
            dns_name: self.dns.resolve().await?,
            listeners: self.listeners.clone(),
            target_groups: self.target_groups.clone(),
            public_subnets: self.public_subnets.clone(),
        })
    }
}

/// Fully-resolved balancer handed to the provisioning engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalancerManifest {
    pub name: String,
    pub group: GroupId,
    pub dns_name: String,
    pub listeners: Vec<ListenerConfig>,
    pub target_groups: Vec<TargetGroupSpec>,
    pub public_subnets: Vec<SubnetId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vpc() -> Deferred<VpcId> {
        Deferred::ready("vpc:test", VpcId::new("vpc-0011"))
    }

    #[tokio::test]
    async fn one_target_group_per_listener() {
        let balancer = BalancerSpec::build(
            "ingress",
            "eu-west-1",
            vpc(),
            vec![SubnetId::new("subnet-pub-a")],
            vec![ListenerConfig::http(80), ListenerConfig::https(443, "cert-1")],
        )
        .unwrap();

        assert_eq!(balancer.target_groups().len(), 2);
        assert_eq!(balancer.target_groups()[0].name, "ingress-tg-80");
        assert_eq!(balancer.group().ingress().len(), 2);
    }

    #[tokio::test]
    async fn dns_name_resolves_after_group() {
        let balancer = BalancerSpec::build(
            "ingress",
            "eu-west-1",
            vpc(),
            vec![SubnetId::new("subnet-pub-a")],
            vec![ListenerConfig::http(80)],
        )
        .unwrap();

        assert_eq!(
            balancer.dns_name().resolve().await.unwrap(),
            "ingress.eu-west-1.lb.internal"
        );
    }

    #[tokio::test]
    async fn fleet_rules_admit_only_the_balancer_group() {
        let balancer = BalancerSpec::build(
            "ingress",
            "eu-west-1",
            vpc(),
            vec![SubnetId::new("subnet-pub-a")],
            vec![ListenerConfig::http(80)],
        )
        .unwrap();

        let rules = balancer.fleet_rules().unwrap();
        assert_eq!(rules.len(), 1);
        match &rules[0].source {
            groundplan_core::RuleSource::PeerGroup(group) => {
                assert_eq!(
                    group.resolve().await.unwrap(),
                    GroupId::new("sg-ingress-lb")
                );
            }
            other => panic!("expected a peer group source, got {other:?}"),
        }
    }
}
