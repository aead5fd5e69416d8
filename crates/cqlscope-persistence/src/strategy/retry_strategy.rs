//! Error-handling strategies using enum dispatch.

use cqlscope_domain::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::PersistenceError;

/// What to do when `execute` fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Propagate the first error
    Raise,
    /// Sleep and retry while the budget lasts
    #[default]
    Retry,
    /// Reset pooled connections, then sleep and retry
    ClearAndRetry,
}

/// Outcome of consulting a policy about one failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Raise,
    Retry { delay: Duration, clear_pool: bool },
}

impl ErrorPolicy {
    /// Decide the next transition after `error`.
    ///
    /// Only connection errors are ever retried, and never once the budget is spent.
    pub fn handle_error(
        &self,
        error: &PersistenceError,
        retries_remaining: u32,
        delay: Duration,
    ) -> RetryDecision {
        if !error.is_retryable() || retries_remaining == 0 {
            return RetryDecision::Raise;
        }

        match self {
            Self::Raise => RetryDecision::Raise,
            Self::Retry => RetryDecision::Retry {
                delay,
                clear_pool: false,
            },
            Self::ClearAndRetry => RetryDecision::Retry {
                delay,
                clear_pool: true,
            },
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Raise => "raise",
            Self::Retry => "retry",
            Self::ClearAndRetry => "clear_and_retry",
        }
    }
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorPolicy {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raise" => Ok(Self::Raise),
            "retry" => Ok(Self::Retry),
            "clear_and_retry" | "clear-and-retry" => Ok(Self::ClearAndRetry),
            _ => Err(DomainError::UnknownErrorPolicy(s.to_string())),
        }
    }
}

/// An error policy plus its retry budget and delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub policy: ErrorPolicy,
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            policy: ErrorPolicy::Retry,
            max_retries: 3,
            delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub const fn raise() -> Self {
        Self {
            policy: ErrorPolicy::Raise,
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }

    pub const fn retry(max_retries: u32, delay: Duration) -> Self {
        Self {
            policy: ErrorPolicy::Retry,
            max_retries,
            delay,
        }
    }

    pub const fn clear_and_retry(max_retries: u32, delay: Duration) -> Self {
        Self {
            policy: ErrorPolicy::ClearAndRetry,
            max_retries,
            delay,
        }
    }

    pub fn handle_error(&self, error: &PersistenceError, retries_remaining: u32) -> RetryDecision {
        self.policy.handle_error(error, retries_remaining, self.delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection_error() -> PersistenceError {
        PersistenceError::Connection("broken pipe".into())
    }

    #[test]
    fn test_raise_never_retries() {
        let decision = ErrorPolicy::Raise.handle_error(&connection_error(), 5, Duration::ZERO);
        assert_eq!(decision, RetryDecision::Raise);
    }

    #[test]
    fn test_retry_until_budget_spent() {
        let policy = RetryPolicy::retry(2, Duration::from_millis(10));
        assert_eq!(
            policy.handle_error(&connection_error(), 2),
            RetryDecision::Retry {
                delay: Duration::from_millis(10),
                clear_pool: false
            }
        );
        assert_eq!(policy.handle_error(&connection_error(), 0), RetryDecision::Raise);
    }

    #[test]
    fn test_clear_and_retry_clears_pool() {
        let policy = RetryPolicy::clear_and_retry(1, Duration::from_secs(1));
        assert!(matches!(
            policy.handle_error(&connection_error(), 1),
            RetryDecision::Retry { clear_pool: true, .. }
        ));
    }

    #[test]
    fn test_non_connection_errors_are_fatal() {
        let policy = RetryPolicy::retry(3, Duration::ZERO);
        let schema = PersistenceError::Schema("keyspace blog does not exist".into());
        assert_eq!(policy.handle_error(&schema, 3), RetryDecision::Raise);
    }

    #[test]
    fn test_parse_policy() {
        assert_eq!(
            "clear_and_retry".parse::<ErrorPolicy>().unwrap(),
            ErrorPolicy::ClearAndRetry
        );
        assert_eq!("RAISE".parse::<ErrorPolicy>().unwrap(), ErrorPolicy::Raise);
        assert!("sometimes".parse::<ErrorPolicy>().is_err());
    }
}
