//! Topology outputs
//!
//! The flat mapping of externally meaningful identifiers — the system's
//! only externally observed artifact. Keys are deterministic for a given
//! declaration: `entryAddress`, `<unit>.roleId` and `<unit>.poolName` per
//! unit, and `ingressDnsName` (empty when no balancer is attached).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const ENTRY_ADDRESS: &str = "entryAddress";
pub const INGRESS_DNS_NAME: &str = "ingressDnsName";

pub fn role_id_key(unit: &str) -> String {
    format!("{unit}.roleId")
}

pub fn pool_name_key(unit: &str) -> String {
    format!("{unit}.poolName")
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopologyOutputs {
    entries: BTreeMap<String, String>,
}

impl TopologyOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn entry_address(&self) -> &str {
        self.get(ENTRY_ADDRESS).unwrap_or_default()
    }

    pub fn ingress_dns_name(&self) -> &str {
        self.get(INGRESS_DNS_NAME).unwrap_or_default()
    }

    pub fn role_id(&self, unit: &str) -> Option<&str> {
        self.get(&role_id_key(unit))
    }

    pub fn pool_name(&self, unit: &str) -> Option<&str> {
        self.get(&pool_name_key(unit))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_ingress_reads_as_empty_string() {
        let outputs = TopologyOutputs::new();
        assert_eq!(outputs.ingress_dns_name(), "");
    }

    #[test]
    fn keys_iterate_in_stable_order() {
        let mut outputs = TopologyOutputs::new();
        outputs.insert(pool_name_key("discovery"), "discovery-pool");
        outputs.insert(ENTRY_ADDRESS, "access.eu-west-1.compute.internal");
        outputs.insert(role_id_key("discovery"), "discovery-role");

        let keys: Vec<_> = outputs.keys().collect();
        assert_eq!(
            keys,
            vec!["discovery.poolName", "discovery.roleId", "entryAddress"]
        );
    }
}
