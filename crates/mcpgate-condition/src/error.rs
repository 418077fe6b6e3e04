// crates/mcpgate-condition/src/error.rs
// ============================================================================
// Module: Condition Errors
// Description: Error taxonomy for condition tree validation and evaluation.
// ============================================================================

use thiserror::Error;

/// Errors raised while validating or evaluating a [`crate::ConditionTree`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConditionError {
    /// The tree nests `all`/`any` composites deeper than the configured limit.
    #[error("condition tree nests deeper than {limit} levels")]
    NestingTooDeep {
        /// The configured nesting limit that was exceeded.
        limit: usize,
    },
    /// The tree has more total nodes than the configured limit.
    #[error("condition tree has more than {limit} nodes")]
    TooManyNodes {
        /// The configured node-count limit that was exceeded.
        limit: usize,
    },
    /// A leaf failed to resolve (e.g. an invalid regex or CIDR at compile time).
    #[error("condition leaf rejected: {0}")]
    InvalidLeaf(String),
}
