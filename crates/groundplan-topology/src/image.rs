//! Machine image selection
//!
//! Every pool boots from an image picked by filter through an external
//! catalog. A selector matching zero images is an error — composition never
//! falls back to an unfiltered selection.

use async_trait::async_trait;
use groundplan_core::{Deferred, ImageId, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Owner id of the public base images used by the access host.
pub const PUBLIC_BASE_IMAGE_OWNER: &str = "099720109477";

/// Filter describing which machine image a pool boots from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSelector {
    pub name_regex: String,
    pub owners: Vec<String>,
    pub most_recent: bool,
}

impl ImageSelector {
    /// An image baked and owned by this account, e.g. `consul-.*`.
    pub fn owned(name_regex: impl Into<String>) -> Self {
        Self {
            name_regex: name_regex.into(),
            owners: vec!["self".to_string()],
            most_recent: true,
        }
    }

    /// A public image from a named owner.
    pub fn from_owner(owner: impl Into<String>, name_regex: impl Into<String>) -> Self {
        Self {
            name_regex: name_regex.into(),
            owners: vec![owner.into()],
            most_recent: true,
        }
    }
}

/// External image lookup.
///
/// Implementations must fail with
/// [`UnresolvedDependency`](groundplan_core::PlanError::UnresolvedDependency)
/// when no image matches the selector.
#[async_trait]
pub trait ImageCatalog: Send + Sync {
    async fn find_image(&self, selector: &ImageSelector) -> Result<ImageId>;
}

/// Wrap a catalog lookup in a deferred handle.
///
/// The lookup runs when the first dependent spec resolves the handle and is
/// memoized; independent lookups may be driven concurrently.
pub fn select_image(catalog: Arc<dyn ImageCatalog>, selector: ImageSelector) -> Deferred<ImageId> {
    let label = format!("image:{}", selector.name_regex);
    Deferred::lazy(label, async move { catalog.find_image(&selector).await })
}

#[cfg(test)]
mod tests {
    use super::*;
    use groundplan_core::PlanError;

    struct EmptyCatalog;

    #[async_trait]
    impl ImageCatalog for EmptyCatalog {
        async fn find_image(&self, selector: &ImageSelector) -> Result<ImageId> {
            Err(PlanError::unresolved(
                format!("image:{}", selector.name_regex),
                "no image matches filter",
            ))
        }
    }

    #[tokio::test]
    async fn zero_matches_surface_as_unresolved_dependency() {
        let image = select_image(Arc::new(EmptyCatalog), ImageSelector::owned("consul-.*"));
        assert!(matches!(
            image.resolve().await.unwrap_err(),
            PlanError::UnresolvedDependency { .. }
        ));

        // derived values fail the same way, with no partial result
        let derived = image.map(|id| id.as_str().to_string());
        assert!(derived.resolve().await.is_err());
    }
}
