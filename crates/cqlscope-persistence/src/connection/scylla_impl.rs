//! ScyllaDB connection implementation.

use async_trait::async_trait;
use chrono::DateTime;
use cqlscope_domain::CqlValue;
use scylla::frame::response::result::{CqlValue as ScyllaValue, Row as ScyllaRow};
use scylla::frame::value::CqlTimestamp;
use scylla::{QueryResult, Session, SessionBuilder};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use super::{Connection, Row, RowSet};
use crate::config::ClusterConfig;
use crate::error::{PersistenceError, Result};

// =============================================================================
// SCYLLA CONNECTION
// =============================================================================

/// ScyllaDB session wrapper. The driver owns the per-node pools; `reset`
/// replaces the whole session.
pub struct ScyllaConnection {
    session: RwLock<Arc<Session>>,
    config: ClusterConfig,
}

impl ScyllaConnection {
    /// Connect and switch to the configured keyspace.
    pub async fn new(config: ClusterConfig) -> Result<Self> {
        let session = open_session(&config).await?;
        Ok(Self {
            session: RwLock::new(Arc::new(session)),
            config,
        })
    }

    /// Get a handle on the current session.
    pub async fn session(&self) -> Arc<Session> {
        self.session.read().await.clone()
    }

    pub const fn config(&self) -> &ClusterConfig {
        &self.config
    }
}

#[async_trait]
impl Connection for ScyllaConnection {
    async fn execute(&self, cql: &str, values: &[CqlValue]) -> Result<RowSet> {
        let session = self.session().await;
        let bound: Vec<Option<ScyllaValue>> = values.iter().map(to_scylla_value).collect();

        let result = session.query_unpaged(cql, bound).await?;
        rows_from_result(result)
    }

    async fn reset(&self) -> Result<()> {
        info!(hosts = ?self.config.hosts, "Resetting ScyllaDB session");
        let fresh = open_session(&self.config).await?;
        *self.session.write().await = Arc::new(fresh);
        Ok(())
    }
}

async fn open_session(config: &ClusterConfig) -> Result<Session> {
    info!(hosts = ?config.hosts, keyspace = %config.keyspace, "Connecting to ScyllaDB cluster");

    let mut builder = SessionBuilder::new().known_nodes(&config.hosts);
    if let (Some(user), Some(pass)) = (&config.username, &config.password) {
        builder = builder.user(user, pass);
    }

    let session = builder.build().await?;
    session.use_keyspace(&config.keyspace, false).await?;

    info!("Connected to ScyllaDB cluster");
    Ok(session)
}

// =============================================================================
// VALUE CONVERSION
// =============================================================================

fn rows_from_result(result: QueryResult) -> Result<RowSet> {
    if !result.is_rows() {
        return Ok(RowSet::empty());
    }

    let rows_result = result
        .into_rows_result()
        .map_err(|e| PersistenceError::Connection(e.to_string()))?;
    let names: Vec<String> = rows_result
        .column_specs()
        .iter()
        .map(|spec| spec.name().to_string())
        .collect();

    let mut rows = Vec::new();
    for row in rows_result
        .rows::<ScyllaRow>()
        .map_err(|e| PersistenceError::Connection(e.to_string()))?
    {
        let row = row.map_err(|e| PersistenceError::Connection(e.to_string()))?;
        rows.push(Row::new(
            names
                .iter()
                .cloned()
                .zip(row.columns.into_iter().map(from_scylla_value))
                .collect(),
        ));
    }

    Ok(RowSet::new(rows))
}

/// Integers bind as `bigint`.
fn to_scylla_value(value: &CqlValue) -> Option<ScyllaValue> {
    match value {
        CqlValue::Null => None,
        CqlValue::Boolean(b) => Some(ScyllaValue::Boolean(*b)),
        CqlValue::Int(i) => Some(ScyllaValue::BigInt(*i)),
        CqlValue::Double(d) => Some(ScyllaValue::Double(*d)),
        CqlValue::Text(s) => Some(ScyllaValue::Text(s.clone())),
        CqlValue::Uuid(u) => Some(ScyllaValue::Uuid(*u)),
        CqlValue::Timestamp(ts) => Some(ScyllaValue::Timestamp(CqlTimestamp(ts.timestamp_millis()))),
        CqlValue::List(items) => Some(ScyllaValue::List(
            items.iter().filter_map(to_scylla_value).collect(),
        )),
    }
}

fn from_scylla_value(value: Option<ScyllaValue>) -> CqlValue {
    match value {
        None | Some(ScyllaValue::Empty) => CqlValue::Null,
        Some(ScyllaValue::Boolean(b)) => CqlValue::Boolean(b),
        Some(ScyllaValue::TinyInt(i)) => CqlValue::Int(i64::from(i)),
        Some(ScyllaValue::SmallInt(i)) => CqlValue::Int(i64::from(i)),
        Some(ScyllaValue::Int(i)) => CqlValue::Int(i64::from(i)),
        Some(ScyllaValue::BigInt(i)) => CqlValue::Int(i),
        Some(ScyllaValue::Counter(c)) => CqlValue::Int(c.0),
        Some(ScyllaValue::Float(f)) => CqlValue::Double(f64::from(f)),
        Some(ScyllaValue::Double(d)) => CqlValue::Double(d),
        Some(ScyllaValue::Text(s) | ScyllaValue::Ascii(s)) => CqlValue::Text(s),
        Some(ScyllaValue::Uuid(u)) => CqlValue::Uuid(u),
        Some(ScyllaValue::Timestamp(ts)) => {
            DateTime::from_timestamp_millis(ts.0).map_or(CqlValue::Null, CqlValue::Timestamp)
        }
        Some(ScyllaValue::List(items) | ScyllaValue::Set(items)) => {
            CqlValue::List(items.into_iter().map(|v| from_scylla_value(Some(v))).collect())
        }
        Some(other) => CqlValue::Text(format!("{other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_to_scylla_value() {
        assert!(matches!(
            to_scylla_value(&CqlValue::Int(42)),
            Some(ScyllaValue::BigInt(42))
        ));
        assert!(to_scylla_value(&CqlValue::Null).is_none());
    }

    #[test]
    fn test_timestamp_survives_conversion() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let scylla = to_scylla_value(&CqlValue::Timestamp(ts));
        assert_eq!(from_scylla_value(scylla), CqlValue::Timestamp(ts));
    }

    #[test]
    fn test_narrow_integers_widen() {
        assert_eq!(from_scylla_value(Some(ScyllaValue::Int(7))), CqlValue::Int(7));
        assert_eq!(from_scylla_value(None), CqlValue::Null);
    }
}
