//! # cqlscope Persistence Library
//!
//! Client-side CQL query layer: chainable scopes, batch accumulation and
//! retry policies over one pooled connection.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Application Layer                        │
//! └─────────────────────────────────────────────────────────────┘
//!                │                               │
//!                ▼                               ▼
//! ┌───────────────────────────┐   ┌──────────────────────────────┐
//! │          Scope            │   │            Batch             │
//! │ (select/where/limit/...)  │──▶│  (buffer, auto-apply, flush) │
//! └───────────────────────────┘   └──────────────────────────────┘
//!                │    Writer                     │
//!                ▼                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Keyspace                             │
//! │        (execute + RetryPolicy, pool permits, slowlog)        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Connection (trait)                         │
//! │            ScyllaConnection  |  test double                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - `scylla`: Enable the ScyllaDB connection (default)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cqlscope_persistence::{Keyspace, KeyspaceConfig, BatchOptions};
//! use cqlscope_domain::Consistency;
//!
//! let keyspace = Keyspace::connect(&KeyspaceConfig::from_env()?).await?;
//!
//! let rows = keyspace
//!     .table("posts", "id")
//!     .select(["id", "title"])
//!     .where_eq("blog", "tech")
//!     .consistency(Consistency::Quorum)
//!     .limit(10)
//!     .all()
//!     .await?;
//!
//! keyspace
//!     .batch(BatchOptions::auto_apply(100), async |batch| {
//!         keyspace.table("posts", "id").where_eq("blog", "old").delete_all_into(batch).await
//!     })
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod batch;
pub mod config;
pub mod connection;
pub mod error;
pub mod keyspace;
pub mod scope;
pub mod strategy;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use batch::{Batch, BatchOptions};
pub use config::{ClusterConfig, KeyspaceConfig};
pub use connection::{Connection, Row, RowSet, SharedConnection};
pub use error::{PersistenceError, Result};
pub use keyspace::{Keyspace, Writer};
pub use scope::Scope;
pub use strategy::{ErrorPolicy, RetryDecision, RetryPolicy};

#[cfg(feature = "scylla")]
pub use connection::ScyllaConnection;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Connect a keyspace using `CQLSCOPE_*` environment configuration.
///
/// # Errors
///
/// Returns an error if the configuration is malformed or the cluster is unreachable.
#[cfg(feature = "scylla")]
pub async fn connect_from_env() -> Result<Keyspace> {
    let config = KeyspaceConfig::from_env()?;
    Keyspace::connect(&config).await
}
