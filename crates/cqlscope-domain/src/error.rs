//! Domain error types.

use thiserror::Error;

/// Errors raised while building clause values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("Unknown consistency level: {0}")]
    UnknownConsistency(String),

    #[error("Unknown error policy: {0}")]
    UnknownErrorPolicy(String),
}
