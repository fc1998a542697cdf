//! Background cleanup: prune expired refresh tokens.

use crate::error::ServerError;
use crate::storage::ServerStorage;
use std::time::Duration;
use tokio::time;

pub fn spawn_cleanup_task(storage: ServerStorage, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            interval.tick().await;
            if let Err(e) = run_cleanup(&storage) {
                tracing::error!("Cleanup error: {}", e);
            }
        }
    });
}

pub fn run_cleanup(storage: &ServerStorage) -> Result<usize, ServerError> {
    let removed = storage.prune_expired_refresh_tokens(keeper_core::clock::now())?;
    tracing::debug!(removed, "Cleanup completed");
    Ok(removed)
}
