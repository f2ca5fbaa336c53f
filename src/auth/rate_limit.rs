//! Per-identity request rate limiting.
//!
//! A fixed window is tracked for each authenticated identity: the first
//! request in a window sets count=1 and a reset instant, subsequent requests
//! increment the count until the limit is hit, and the window is recreated
//! once the reset instant passes. Rejections report the remaining whole
//! seconds until reset so clients can back off deterministically.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Once the window map grows past this many identities, expired entries are
/// swept before inserting new ones so the map stays bounded.
const SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug, Clone)]
struct Window {
    count: u32,
    reset_at: Instant,
}

/// Fixed-window rate limiter keyed by identity id.
///
/// The read-modify-write of a window happens entirely under one lock
/// acquisition with no await inside, so concurrent requests from the same
/// identity can never under-count.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    windows: Arc<Mutex<HashMap<String, Window>>>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter allowing `limit` requests per `window`.
    pub fn new(limit: u32, window: Duration) -> Self {
        Self { windows: Arc::new(Mutex::new(HashMap::new())), limit, window }
    }

    /// Check whether a request from `key` is allowed.
    ///
    /// Returns `Ok(())` if allowed, `Err(retry_after_secs)` if the identity
    /// has exhausted its window.
    pub async fn check(&self, key: &str) -> Result<(), u64> {
        let now = Instant::now();
        let mut windows = self.windows.lock().await;

        if windows.len() >= SWEEP_THRESHOLD {
            windows.retain(|_, w| w.reset_at > now);
        }

        match windows.get_mut(key) {
            Some(window) if window.reset_at > now => {
                if window.count < self.limit {
                    window.count += 1;
                    debug!(key = %key, count = window.count, limit = self.limit, "Rate limit check passed");
                    Ok(())
                } else {
                    let remaining = window.reset_at.duration_since(now);
                    let retry_after = seconds_ceil(remaining);
                    warn!(key = %key, retry_after_seconds = retry_after, "Rate limit exceeded");
                    Err(retry_after)
                }
            }
            _ => {
                windows.insert(key.to_string(), Window { count: 1, reset_at: now + self.window });
                debug!(key = %key, count = 1, limit = self.limit, "Rate limit window started");
                Ok(())
            }
        }
    }

    /// Number of identities currently tracked (expired windows included until
    /// the next sweep).
    pub async fn tracked_identities(&self) -> usize {
        self.windows.lock().await.len()
    }
}

fn seconds_ceil(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}
