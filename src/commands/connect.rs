//! Open the database connection through the cache

use crate::cache::ConnectionCache;
use crate::config::Config;
use crate::connector::Connector;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Summary of a `connect` run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectReport {
    /// Callers that asked for the connection
    pub callers: usize,
    /// Connection attempts the cache started
    pub attempts: u64,
    /// Whether every caller got the very same handle
    pub shared_handle: bool,
}

/// Handle the connect command
#[allow(clippy::disallowed_methods)]
pub async fn handle_connect(config: &Config, callers: usize) -> Result<()> {
    // A missing URI stops here, before any connection is requested.
    let cache = Arc::new(ConnectionCache::from_config(&config.database)?);
    info!(
        "Connecting to {} with {} caller(s)",
        cache.uri(),
        callers.max(1)
    );

    let report = connect_with(&cache, callers).await?;

    println!("✅ Connected to {} ({})", cache.uri(), cache.uri().backend());
    println!(
        "   {} caller(s) shared {} connection attempt(s)",
        report.callers, report.attempts
    );
    if !report.shared_handle {
        println!("   ⚠️  Callers received different connection handles");
    }
    Ok(())
}

/// Ask `cache` for its connection from `callers` concurrent tasks
pub async fn connect_with<C>(cache: &Arc<ConnectionCache<C>>, callers: usize) -> Result<ConnectReport>
where
    C: Connector + 'static,
{
    let callers = callers.max(1);
    let tasks: Vec<_> = (0..callers)
        .map(|_| {
            let cache = Arc::clone(cache);
            tokio::spawn(async move { cache.get_connection().await })
        })
        .collect();

    let mut first = None;
    let mut shared_handle = true;
    for task in futures::future::join_all(tasks).await {
        let connection = task
            .context("connection task panicked")?
            .context("Failed to open database connection")?;
        match &first {
            None => first = Some(connection),
            Some(existing) => shared_handle &= Arc::ptr_eq(existing, &connection),
        }
    }

    let attempts = cache.attempts();
    debug!(attempts, shared_handle, "All callers received a connection");
    Ok(ConnectReport {
        callers,
        attempts,
        shared_handle,
    })
}
