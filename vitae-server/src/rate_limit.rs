//! Per-session sliding-window rate limiting.
//!
//! Tracks timestamps of accepted requests per session and enforces a
//! requests-per-minute limit. State is process-local and ephemeral; a
//! session's entries are discarded on disconnect.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Sliding window length.
const WINDOW_SECONDS: u64 = 60;

/// Per-session sliding-window rate limiter.
///
/// All state lives behind a single mutex; contention is negligible next to
/// the network I/O each admitted request goes on to perform.
pub struct SessionRateLimiter {
    limit: usize,
    window: Duration,
    requests: Mutex<HashMap<String, Vec<Instant>>>,
}

impl SessionRateLimiter {
    /// Create a limiter allowing `requests_per_minute` per session.
    pub fn new(requests_per_minute: u32) -> Self {
        Self {
            limit: requests_per_minute as usize,
            window: Duration::from_secs(WINDOW_SECONDS),
            requests: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether a request is allowed for the given session.
    ///
    /// Expired timestamps are purged first. At the limit the attempt is
    /// rejected without being recorded, so rejected calls never consume a
    /// slot.
    pub async fn allow(&self, session_id: &str) -> bool {
        let mut requests = self.requests.lock().await;
        let now = Instant::now();

        let timestamps = requests.entry(session_id.to_string()).or_default();
        timestamps.retain(|ts| now.duration_since(*ts) < self.window);

        if timestamps.len() >= self.limit {
            warn!(
                session_id = %session_id,
                count = timestamps.len(),
                limit = self.limit,
                "Rate limit exceeded"
            );
            return false;
        }

        timestamps.push(now);
        true
    }

    /// Discard all tracked state for a session (called on disconnect).
    pub async fn reset(&self, session_id: &str) {
        let mut requests = self.requests.lock().await;
        if requests.remove(session_id).is_some() {
            debug!(session_id = %session_id, "Rate limit tracking reset");
        }
    }
}
