//! Fixed pools and scaling specifications
//!
//! The clusters here are long-lived and stateful; elasticity is not a goal.
//! A pool therefore declares a single size and its minimum, maximum and
//! desired counts are all that size, by construction.

use groundplan_core::{Deferred, GroupId, ImageId, Result, SubnetId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A scaling specification where min, max and desired counts are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FixedPool {
    size: u32,
}

impl FixedPool {
    pub fn of(size: u32) -> Self {
        Self { size }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn min_size(&self) -> u32 {
        self.size
    }

    pub fn max_size(&self) -> u32 {
        self.size
    }

    pub fn desired_capacity(&self) -> u32 {
        self.size
    }
}

/// Root block device attached to every pool member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootVolume {
    pub volume_type: String,
    pub size_gb: u32,
    pub delete_on_termination: bool,
}

impl Default for RootVolume {
    fn default() -> Self {
        Self {
            volume_type: "standard".to_string(),
            size_gb: 50,
            delete_on_termination: true,
        }
    }
}

/// The compute specification of one cluster unit.
///
/// `user_data` is a fully-rendered string: bootstrap substitution values are
/// resolved before a spec exists, never pending handles. Security groups
/// stay deferred until the manifest is produced.
#[derive(Debug, Clone)]
pub struct PoolSpec {
    pub name: String,
    pub pool: FixedPool,
    pub image: Deferred<ImageId>,
    pub instance_type: String,
    pub role_id: String,
    pub security_groups: Vec<Deferred<GroupId>>,
    pub subnets: Vec<SubnetId>,
    pub user_data: String,
    pub key_pair: Option<String>,
    pub associate_public_ip: bool,
    pub root_volume: RootVolume,
    pub target_groups: Vec<String>,
    pub tags: BTreeMap<String, String>,
}

impl PoolSpec {
    /// Stable pool identifier exported in the topology outputs.
    pub fn pool_name(&self) -> String {
        format!("{}-pool", self.name)
    }

    /// Resolve the image and every group handle into a concrete manifest.
    pub async fn manifest(&self) -> Result<PoolManifest> {
        let image = self.image.resolve().await?;
        let security_groups = Deferred::join_all(self.security_groups.clone())
            .resolve()
            .await?;

        Ok(PoolManifest {
            pool_name: self.pool_name(),
            image,
            instance_type: self.instance_type.clone(),
            role_id: self.role_id.clone(),
            min_size: self.pool.min_size(),
            max_size: self.pool.max_size(),
            desired_capacity: self.pool.desired_capacity(),
            security_groups,
            subnets: self.subnets.clone(),
            user_data: self.user_data.clone(),
            key_pair: self.key_pair.clone(),
            associate_public_ip: self.associate_public_ip,
            root_volume: self.root_volume.clone(),
            target_groups: self.target_groups.clone(),
            tags: self.tags.clone(),
        })
    }
}

/// Fully-resolved pool: launch settings plus scaling bounds, ready for the
/// provisioning engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolManifest {
    pub pool_name: String,
    pub image: ImageId,
    pub instance_type: String,
    pub role_id: String,
    pub min_size: u32,
    pub max_size: u32,
    pub desired_capacity: u32,
    pub security_groups: Vec<GroupId>,
    pub subnets: Vec<SubnetId>,
    pub user_data: String,
    pub key_pair: Option<String>,
    pub associate_public_ip: bool,
    pub root_volume: RootVolume,
    pub target_groups: Vec<String>,
    pub tags: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_pool_bounds_are_equal() {
        let pool = FixedPool::of(3);
        assert_eq!(pool.min_size(), 3);
        assert_eq!(pool.max_size(), 3);
        assert_eq!(pool.desired_capacity(), 3);
    }

    #[tokio::test]
    async fn manifest_resolves_image_and_groups() {
        let spec = PoolSpec {
            name: "discovery".to_string(),
            pool: FixedPool::of(3),
            image: Deferred::ready("image:consul-.*", ImageId::new("ami-0abc")),
            instance_type: "t3.small".to_string(),
            role_id: "discovery-role".to_string(),
            security_groups: vec![
                Deferred::ready("sg:discovery-server", GroupId::new("sg-discovery-server")),
                Deferred::ready("sg:discovery-client", GroupId::new("sg-discovery-client")),
            ],
            subnets: vec![SubnetId::new("subnet-a")],
            user_data: "#!/bin/bash\n".to_string(),
            key_pair: Some("ops".to_string()),
            associate_public_ip: false,
            root_volume: RootVolume::default(),
            target_groups: Vec::new(),
            tags: BTreeMap::new(),
        };

        let manifest = spec.manifest().await.unwrap();
        assert_eq!(manifest.pool_name, "discovery-pool");
        assert_eq!(manifest.image, ImageId::new("ami-0abc"));
        assert_eq!(manifest.security_groups.len(), 2);
        assert_eq!(manifest.min_size, manifest.desired_capacity);
        assert_eq!(manifest.max_size, manifest.desired_capacity);
    }
}
