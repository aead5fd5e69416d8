//! # Strategy Module
//!
//! Enum-based error-handling strategies consulted after a failed `execute`.
//!
//! ## Available Strategies
//!
//! - `Raise` - Propagate the first error unchanged
//! - `Retry` - Sleep, then retry while budget remains (default)
//! - `ClearAndRetry` - Reset the connection pool, sleep, then retry
//!
//! Exhausting the budget always returns the original error, never a wrapper.
//!
//! ## Example
//!
//! ```rust
//! use cqlscope_persistence::strategy::{RetryDecision, RetryPolicy};
//! use cqlscope_persistence::PersistenceError;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::retry(2, Duration::from_millis(50));
//! let err = PersistenceError::Connection("reset by peer".into());
//!
//! assert!(matches!(policy.handle_error(&err, 2), RetryDecision::Retry { .. }));
//! assert_eq!(policy.handle_error(&err, 0), RetryDecision::Raise);
//! ```

pub mod retry_strategy;

pub use retry_strategy::{ErrorPolicy, RetryDecision, RetryPolicy};
