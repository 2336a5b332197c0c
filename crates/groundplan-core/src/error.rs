//! Composition error types

use thiserror::Error;

/// Errors raised while composing a topology.
///
/// All variants are unrecoverable at the point of construction: nothing is
/// retried internally, and a failure aborts the composition with no partial
/// result. Variants are `Clone` because a failed deferred computation hands
/// the same error to every value derived from it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("invalid rule range: from_port {from}, to_port {to}")]
    InvalidRuleRange { from: i64, to: i64 },

    #[error("role '{0}' grants no permissions")]
    InvalidPolicy(String),

    #[error("unresolved dependency '{label}': {reason}")]
    UnresolvedDependency { label: String, reason: String },

    #[error("cyclic or missing dependency: {0}")]
    CyclicOrMissingDependency(String),

    #[error("bootstrap template error: {0}")]
    TemplateRender(String),
}

impl PlanError {
    pub fn unresolved(label: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnresolvedDependency {
            label: label.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlanError>;
