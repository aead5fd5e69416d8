//! Persistence layer error types

use cqlscope_domain::DomainError;
use thiserror::Error;

/// Persistence layer errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    /// Illegal scope combination, detected before any network call.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Transient wire or protocol failure. The only kind retry policies act on.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The server rejected the statement itself (unknown keyspace, bad syntax, ...).
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Row not found: {table} with key {key}")]
    NotFound { table: String, key: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl PersistenceError {
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_))
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

#[cfg(feature = "scylla")]
impl From<scylla::transport::errors::NewSessionError> for PersistenceError {
    fn from(err: scylla::transport::errors::NewSessionError) -> Self {
        Self::Connection(err.to_string())
    }
}

#[cfg(feature = "scylla")]
impl From<scylla::transport::errors::QueryError> for PersistenceError {
    fn from(err: scylla::transport::errors::QueryError) -> Self {
        use scylla::transport::errors::{DbError, QueryError};

        match &err {
            QueryError::DbError(
                DbError::Invalid
                | DbError::SyntaxError
                | DbError::Unauthorized
                | DbError::ConfigError,
                _,
            ) => Self::Schema(err.to_string()),
            _ => Self::Connection(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
