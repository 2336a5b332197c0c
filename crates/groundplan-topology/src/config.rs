//! Provider configuration
//!
//! The ambient provider context — region, SSH key pair, tags applied to
//! every pool — is an explicit struct threaded into the composer's entry
//! point, never process-wide state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Region the topology is declared in; also feeds synthesized
    /// addresses and DNS names.
    pub region: String,

    /// SSH key pair installed on every pool member.
    pub key_pair: Option<String>,

    /// Tags propagated to every pool.
    pub base_tags: BTreeMap<String, String>,
}

impl ProviderConfig {
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            key_pair: None,
            base_tags: BTreeMap::new(),
        }
    }

    pub fn key_pair(mut self, name: impl Into<String>) -> Self {
        self.key_pair = Some(name.into());
        self
    }

    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.base_tags.insert(key.into(), value.into());
        self
    }
}
