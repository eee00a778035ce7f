//! Fixed-window request counting.
//!
//! One window per `"<mode>:<identifier>"` key. A window resets 60 seconds
//! after it started; a burst straddling a window boundary can therefore
//! admit up to twice the nominal limit. That is the contract of a fixed
//! window, not a bug to fix here.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Length of one counting window.
pub const WINDOW: Duration = Duration::from_secs(60);

/// Cadence of the background sweep that drops stale windows.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Window {
    count: u32,
    started_at: Instant,
}

/// Outcome of a rate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Admit { remaining: u32 },
    Reject { retry_after: u64 },
}

pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Count one request against `key` with the given per-window limit.
    pub fn check(&self, key: &str, limit: u32) -> RateDecision {
        self.check_at(key, limit, Instant::now())
    }

    fn check_at(&self, key: &str, limit: u32, now: Instant) -> RateDecision {
        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");
        match windows.get_mut(key) {
            Some(window) if now.duration_since(window.started_at) <= WINDOW => {
                if window.count >= limit {
                    let until_reset = WINDOW - now.duration_since(window.started_at);
                    RateDecision::Reject {
                        retry_after: until_reset.as_millis().div_ceil(1000) as u64,
                    }
                } else {
                    window.count += 1;
                    RateDecision::Admit {
                        remaining: limit - window.count,
                    }
                }
            }
            _ => {
                // First request for this key, or the previous window went
                // stale; either way the count restarts at one.
                windows.insert(
                    key.to_string(),
                    Window {
                        count: 1,
                        started_at: now,
                    },
                );
                RateDecision::Admit {
                    remaining: limit.saturating_sub(1),
                }
            }
        }
    }

    /// Drop windows that started more than one interval ago.
    pub fn sweep(&self) {
        self.sweep_at(Instant::now());
    }

    fn sweep_at(&self, now: Instant) {
        let mut windows = self.windows.lock().expect("rate limiter mutex poisoned");
        let before = windows.len();
        windows.retain(|_, window| now.duration_since(window.started_at) <= WINDOW);
        let removed = before - windows.len();
        if removed > 0 {
            tracing::debug!(removed, "Swept stale rate windows");
        }
    }

    /// Number of live windows.
    pub fn window_count(&self) -> usize {
        self.windows.lock().expect("rate limiter mutex poisoned").len()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
