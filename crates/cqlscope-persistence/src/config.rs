//! # Keyspace Configuration
//!
//! Environment-based configuration for the keyspace facade. Every value is
//! passed explicitly into [`crate::Keyspace`]; nothing is read at query time.

use cqlscope_domain::Consistency;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{PersistenceError, Result};
use crate::strategy::{ErrorPolicy, RetryPolicy};

/// Cluster contact configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub hosts: Vec<String>,
    pub keyspace: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            hosts: vec!["127.0.0.1:9042".to_string()],
            keyspace: "cqlscope".to_string(),
            username: None,
            password: None,
        }
    }
}

/// Keyspace facade configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyspaceConfig {
    /// Cluster contact points and credentials
    pub cluster: ClusterConfig,

    /// Consistency applied to new scopes and batches that set none
    pub default_consistency: Option<Consistency>,

    /// Error policy, retry budget and delay
    pub retry: RetryPolicy,

    /// Maximum statements holding a connection at once
    pub max_in_flight: usize,

    /// Statements slower than this are logged at WARN
    pub slowlog_threshold: Option<Duration>,
}

impl Default for KeyspaceConfig {
    fn default() -> Self {
        Self {
            cluster: ClusterConfig::default(),
            default_consistency: None,
            retry: RetryPolicy::default(),
            max_in_flight: 32,
            slowlog_threshold: None,
        }
    }
}

impl KeyspaceConfig {
    /// Load configuration from `CQLSCOPE_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Configuration`] when a variable is set but malformed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError::Configuration`] when a variable is set but malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let cluster = ClusterConfig {
            hosts: lookup("CQLSCOPE_HOSTS").map_or(defaults.cluster.hosts, |raw| {
                raw.split(',').map(|h| h.trim().to_string()).collect()
            }),
            keyspace: lookup("CQLSCOPE_KEYSPACE").unwrap_or(defaults.cluster.keyspace),
            username: lookup("CQLSCOPE_USERNAME"),
            password: lookup("CQLSCOPE_PASSWORD"),
        };

        let default_consistency = lookup("CQLSCOPE_CONSISTENCY")
            .map(|raw| parse::<Consistency>("CQLSCOPE_CONSISTENCY", &raw))
            .transpose()?;

        let retry = RetryPolicy {
            policy: lookup("CQLSCOPE_RETRY_POLICY")
                .map(|raw| parse::<ErrorPolicy>("CQLSCOPE_RETRY_POLICY", &raw))
                .transpose()?
                .unwrap_or(defaults.retry.policy),
            max_retries: lookup("CQLSCOPE_MAX_RETRIES")
                .map(|raw| parse::<u32>("CQLSCOPE_MAX_RETRIES", &raw))
                .transpose()?
                .unwrap_or(defaults.retry.max_retries),
            delay: lookup("CQLSCOPE_RETRY_DELAY_MS")
                .map(|raw| parse::<u64>("CQLSCOPE_RETRY_DELAY_MS", &raw))
                .transpose()?
                .map_or(defaults.retry.delay, Duration::from_millis),
        };

        let max_in_flight = lookup("CQLSCOPE_MAX_IN_FLIGHT")
            .map(|raw| parse::<usize>("CQLSCOPE_MAX_IN_FLIGHT", &raw))
            .transpose()?
            .unwrap_or(defaults.max_in_flight);
        if max_in_flight == 0 {
            return Err(PersistenceError::Configuration(
                "CQLSCOPE_MAX_IN_FLIGHT must be positive".to_string(),
            ));
        }

        let slowlog_threshold = lookup("CQLSCOPE_SLOWLOG_MS")
            .map(|raw| parse::<u64>("CQLSCOPE_SLOWLOG_MS", &raw))
            .transpose()?
            .map(Duration::from_millis);

        Ok(Self {
            cluster,
            default_consistency,
            retry,
            max_in_flight,
            slowlog_threshold,
        })
    }
}

fn parse<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| PersistenceError::Configuration(format!("{name}={raw}: {e}")))
}
