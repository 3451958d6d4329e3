//! Request spacing shared by every fetch issued through one fetcher.
//!
//! A single clock, not per-host buckets: sources are fetched strictly one
//! after another, so one clock keeps the request cadence predictable.

use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

/// Enforces a minimum interval between outbound requests.
#[derive(Debug, Default)]
pub struct RequestThrottle {
    last_request: Mutex<Option<Instant>>,
}

impl RequestThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `min_interval` has passed since the last request, then
    /// claim the current instant as the new last request.
    ///
    /// The lock is held across the sleep so concurrent callers queue up
    /// instead of all waking at once.
    pub async fn wait_turn(&self, min_interval: Duration) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < min_interval {
                let wait = min_interval - elapsed;
                tracing::debug!("rate limit: waiting {:?} before next request", wait);
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Record a request sent outside `wait_turn` (a retry).
    pub async fn stamp(&self) {
        *self.last_request.lock().await = Some(Instant::now());
    }
}
