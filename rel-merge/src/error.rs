//! Merge errors

use crate::outcome::MergeKind;

/// Result type for merge operations
pub type Result<T> = std::result::Result<T, MergeError>;

/// Errors raised while declaring or running merges.
///
/// None of these describe an ordinary conflict: an unresolvable conflict is
/// reported as [`MergeOutcome::Unresolved`](crate::MergeOutcome::Unresolved).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MergeError {
    #[error("{type_name} declares {count} concurrency tokens, at most one is allowed")]
    MultipleConcurrencyTokens { type_name: &'static str, count: usize },

    #[error("{policy} policy cannot be attached to {target}")]
    MisplacedPolicy { policy: &'static str, target: String },

    #[error("Invalid bounds: lower bound {lo} exceeds upper bound {hi}")]
    InvalidBounds { lo: String, hi: String },

    #[error("{policy} policy does not support merge kind {kind}")]
    UnsupportedKind { policy: &'static str, kind: MergeKind },

    #[error("Merge configuration for {0} has the wrong type")]
    ConfigTypeMismatch(&'static str),
}
