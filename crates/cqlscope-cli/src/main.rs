//! cqlscope CLI
//!
//! Renders a scoped query from flags, or runs it against the cluster named by
//! the `CQLSCOPE_*` environment variables.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use cqlscope_cli::{Cli, OfflineConnection};
use cqlscope_persistence::{Keyspace, KeyspaceConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("cqlscope=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();
    let config = KeyspaceConfig::from_env()?;

    if args.dry_run {
        let keyspace = Keyspace::new(Arc::new(OfflineConnection), &config);
        println!("{}", args.render(&args.scope(&keyspace)));
        return Ok(());
    }

    info!(
        hosts = ?config.cluster.hosts,
        keyspace = %config.cluster.keyspace,
        "Connecting"
    );
    let keyspace = Keyspace::connect(&config).await?;
    let scope = args.scope(&keyspace);
    info!(cql = %args.render(&scope), "Running query");

    if args.count {
        println!("{}", scope.count().await?);
        return Ok(());
    }

    let mut rows = 0_usize;
    scope
        .each(|row| {
            println!("{}", row.to_json());
            rows += 1;
        })
        .await?;
    info!(rows, "Query complete");

    Ok(())
}
