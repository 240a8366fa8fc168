//! Per-user submission rate limiting.
//!
//! Keeps a log of successful submissions per user and rejects new ones once a
//! user has reached the limit inside the window. Checking never records;
//! callers record only after the submission actually went through.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default window: 4 hours.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(4 * 60 * 60);

/// Default number of submissions allowed per window.
pub const DEFAULT_MAX_PER_WINDOW: usize = 3;

/// Sliding-window submission log.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    window: Duration,
    max_per_window: usize,
    history: HashMap<String, Vec<Instant>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_per_window: usize) -> Self {
        Self {
            window,
            max_per_window,
            history: HashMap::new(),
        }
    }

    /// Check whether a user has hit the limit as of `now`.
    ///
    /// Entries that have left the window are purged.
    pub fn too_many_recent_at(&mut self, user: &str, now: Instant) -> bool {
        let Some(entries) = self.history.get_mut(user) else {
            return false;
        };

        let window = self.window;
        entries.retain(|&t| now.saturating_duration_since(t) < window);

        let count = entries.len();
        if count == 0 {
            self.history.remove(user);
        }
        count >= self.max_per_window
    }

    pub fn too_many_recent(&mut self, user: &str) -> bool {
        self.too_many_recent_at(user, Instant::now())
    }

    /// Record a successful submission at `now`.
    pub fn record_at(&mut self, user: &str, now: Instant) {
        self.history.entry(user.to_string()).or_default().push(now);
    }

    pub fn record(&mut self, user: &str) {
        self.record_at(user, Instant::now());
    }

    /// Number of entries currently stored for a user (purged lazily).
    pub fn recorded(&self, user: &str) -> usize {
        self.history.get(user).map(Vec::len).unwrap_or(0)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_MAX_PER_WINDOW)
    }
}
