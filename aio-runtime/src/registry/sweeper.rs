//! The background TTL reaper: a plain interval tick at a period of
//! roughly `min(5s, min_ttl/2)`.
//!
//! Tick, do the pending work, go back to sleep — no per-item debounce
//! window to manage here, just a clock comparison.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::store::RegistryStore;

/// Runs `store.reap_expired()` on `period` until `cancel` fires.
pub async fn run(store: Arc<RegistryStore>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("ttl sweeper stopping");
                return;
            }
            _ = ticker.tick() => {
                let reaped = store.reap_expired();
                if reaped > 0 {
                    tracing::info!(reaped, "ttl sweeper reaped expired instances");
                }
            }
        }
    }
}

/// `min(5s, min_ttl/2)`, with a floor so very short TTLs don't busy-loop.
pub fn recommended_period(min_ttl_seconds: u32) -> Duration {
    Duration::from_secs(5).min(Duration::from_secs(u64::from(min_ttl_seconds.max(1)) / 2).max(Duration::from_millis(500)))
}
