use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;

const MAX_RATE_LIMIT_ENTRIES: usize = 10_000;

/// One client's window. Replaced wholesale once it expires, never
/// decremented.
#[derive(Clone, Debug)]
pub struct RateWindow {
    pub count: u32,
    pub reset_at: i64, // unix millis
}

/// Process-wide sliding-window counter keyed by client identifier.
///
/// State lives for the process lifetime and resets on restart; rate
/// limiting here is best-effort, not a security boundary. The mutex
/// serializes increments on a key across the multi-threaded runtime so
/// concurrent requests cannot lose updates.
pub struct RateLimiter {
    windows: Mutex<HashMap<String, RateWindow>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Returns whether the request identified by `key` is allowed, and
    /// records it either way. Never fails.
    pub async fn check_and_consume(&self, key: &str, limit: u32, window_ms: i64) -> bool {
        self.check_at(key, limit, window_ms, Utc::now().timestamp_millis())
            .await
    }

    pub async fn check_at(&self, key: &str, limit: u32, window_ms: i64, now: i64) -> bool {
        let mut windows = self.windows.lock().await;
        // Expired entries are otherwise only reclaimed lazily per key, so
        // sweep once the map grows past the cap.
        if windows.len() > MAX_RATE_LIMIT_ENTRIES {
            windows.retain(|_, w| now <= w.reset_at);
        }
        match windows.get_mut(key) {
            Some(window) if now <= window.reset_at => {
                window.count += 1;
                window.count <= limit
            }
            _ => {
                windows.insert(
                    key.to_string(),
                    RateWindow {
                        count: 1,
                        reset_at: now + window_ms,
                    },
                );
                true
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
