//! Network context and subnet lookups
//!
//! The enclosing network is declared elsewhere; units receive its VPC handle
//! and subnet placement here. CIDR blocks of subnets are an asynchronous
//! lookup, surfaced as a deferred value for `VpcCidrs` trust rules.

use async_trait::async_trait;
use groundplan_core::{Deferred, Result, SubnetId, VpcId};
use std::sync::Arc;

/// Network boundary every unit is placed into.
#[derive(Debug, Clone)]
pub struct NetworkContext {
    pub vpc: Deferred<VpcId>,
    pub public_subnets: Vec<SubnetId>,
    pub private_subnets: Vec<SubnetId>,
}

impl NetworkContext {
    pub fn new(
        vpc: Deferred<VpcId>,
        public_subnets: Vec<SubnetId>,
        private_subnets: Vec<SubnetId>,
    ) -> Self {
        Self {
            vpc,
            public_subnets,
            private_subnets,
        }
    }
}

/// External subnet description lookup.
#[async_trait]
pub trait SubnetCatalog: Send + Sync {
    async fn cidr_block(&self, subnet: &SubnetId) -> Result<String>;
}

/// The CIDR blocks of a set of subnets as one deferred value.
///
/// Individual lookups are independent and driven concurrently; any failure
/// fails the whole set.
pub fn subnet_cidrs(catalog: Arc<dyn SubnetCatalog>, subnets: Vec<SubnetId>) -> Deferred<Vec<String>> {
    let label = format!(
        "cidrs:{}",
        subnets
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",")
    );

    Deferred::lazy(label, async move {
        futures_util::future::try_join_all(subnets.iter().map(|s| catalog.cidr_block(s))).await
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use groundplan_core::PlanError;
    use std::collections::BTreeMap;

    struct FixedSubnets(BTreeMap<String, String>);

    #[async_trait]
    impl SubnetCatalog for FixedSubnets {
        async fn cidr_block(&self, subnet: &SubnetId) -> Result<String> {
            self.0
                .get(subnet.as_str())
                .cloned()
                .ok_or_else(|| {
                    PlanError::unresolved(format!("cidr:{subnet}"), "subnet not found")
                })
        }
    }

    #[tokio::test]
    async fn cidrs_resolve_in_declared_order() {
        let catalog = Arc::new(FixedSubnets(BTreeMap::from([
            ("subnet-a".to_string(), "192.168.0.0/24".to_string()),
            ("subnet-b".to_string(), "192.168.1.0/24".to_string()),
        ])));
        let cidrs = subnet_cidrs(
            catalog,
            vec![SubnetId::new("subnet-a"), SubnetId::new("subnet-b")],
        );
        assert_eq!(
            cidrs.resolve().await.unwrap(),
            vec!["192.168.0.0/24", "192.168.1.0/24"]
        );
    }

    #[tokio::test]
    async fn one_missing_subnet_fails_the_whole_set() {
        let catalog = Arc::new(FixedSubnets(BTreeMap::from([(
            "subnet-a".to_string(),
            "192.168.0.0/24".to_string(),
        )])));
        let cidrs = subnet_cidrs(
            catalog,
            vec![SubnetId::new("subnet-a"), SubnetId::new("subnet-zz")],
        );
        assert!(matches!(
            cidrs.resolve().await.unwrap_err(),
            PlanError::UnresolvedDependency { .. }
        ));
    }
}
