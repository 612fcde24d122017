//! Cache pruning scheduler.
//!
//! The SQLite backend keeps rows until they are deleted. When a TTL is
//! configured this loop periodically removes entries that can no longer be
//! served, so the table does not grow without bound.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::signal;
use tokio::time;

use crate::cache::SqliteQuoteCache;

/// Run the pruning loop until `Ctrl+C` (SIGINT) is received.
///
/// Each tick deletes rows older than `ttl`. Errors are logged and the loop
/// continues.
pub async fn run_cache_pruning(cache: Arc<SqliteQuoteCache>, ttl: Duration, every: Duration) {
    let mut interval = time::interval(every);

    tracing::info!(
        "Cache pruning started (ttl: {}s, interval: {}s)",
        ttl.as_secs(),
        every.as_secs()
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                prune_once(&cache, ttl).await;
            }

            _ = signal::ctrl_c() => {
                tracing::info!("Shutdown signal received. Stopping cache pruning.");
                break;
            }
        }
    }

    tracing::info!("Cache pruning stopped cleanly");
}

/// Execute a single prune. Returns the number of rows removed.
async fn prune_once(cache: &SqliteQuoteCache, ttl: Duration) -> u64 {
    let cutoff = chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| Utc::now().checked_sub_signed(ttl));
    let Some(cutoff) = cutoff else {
        tracing::warn!("Cache TTL is out of range, skipping prune");
        return 0;
    };

    match cache.prune_older_than(cutoff).await {
        Ok(0) => 0,
        Ok(removed) => {
            tracing::info!("Pruned {} expired cache rows", removed);
            removed
        }
        Err(err) => {
            tracing::error!("Cache pruning error, skipping tick: {}", err);
            0
        }
    }
}
