//! Login-attempt guard.
//!
//! Counts consecutive failed logins per login key. Once the count reaches
//! the threshold inside the inactivity window, logins for that key need a
//! challenge response. Counters live in a `DashMap`, so keys only contend
//! when they share a shard.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::debug;

use super::AuthPolicy;

#[derive(Debug, Clone)]
struct FailureCounter {
    count: u32,
    window_start: DateTime<Utc>,
    last_failure: DateTime<Utc>,
}

impl FailureCounter {
    fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now >= self.last_failure + window
    }
}

/// Per-login-key failure counters with inactivity expiry.
#[derive(Debug)]
pub struct LoginAttemptGuard {
    counters: DashMap<String, FailureCounter>,
    threshold: u32,
    window: Duration,
}

impl LoginAttemptGuard {
    pub fn new(threshold: u32, window: Duration) -> Self {
        Self {
            counters: DashMap::new(),
            threshold,
            window,
        }
    }

    pub fn from_policy(policy: &AuthPolicy) -> Self {
        Self::new(policy.failure_threshold, policy.failure_window)
    }

    /// Count a failed login. Each failure extends the inactivity window.
    /// Returns the count within the current window.
    pub fn record_failure(&self, login_key: &str) -> u32 {
        let now = Utc::now();
        let mut entry = self
            .counters
            .entry(login_key.to_string())
            .or_insert_with(|| FailureCounter {
                count: 0,
                window_start: now,
                last_failure: now,
            });
        if entry.is_stale(now, self.window) {
            entry.count = 0;
            entry.window_start = now;
        }
        entry.count = entry.count.saturating_add(1);
        entry.last_failure = now;
        debug!(
            login_key,
            count = entry.count,
            window_start = %entry.window_start,
            "login failure recorded"
        );
        entry.count
    }

    /// Whether the next login for `login_key` must carry a challenge response.
    pub fn is_challenge_required(&self, login_key: &str) -> bool {
        let now = Utc::now();
        self.counters
            .get(login_key)
            .is_some_and(|c| !c.is_stale(now, self.window) && c.count >= self.threshold)
    }

    /// Current failure count, zero once the window has lapsed.
    pub fn failure_count(&self, login_key: &str) -> u32 {
        let now = Utc::now();
        self.counters
            .get(login_key)
            .filter(|c| !c.is_stale(now, self.window))
            .map_or(0, |c| c.count)
    }

    /// Clear the counter after a successful login.
    pub fn record_success(&self, login_key: &str) {
        self.counters.remove(login_key);
    }

    /// Evict counters whose window has lapsed.
    pub fn cleanup(&self) {
        let now = Utc::now();
        self.counters.retain(|_, c| !c.is_stale(now, self.window));
    }

    /// Spawn a periodic cleanup task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let guard = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(StdDuration::from_secs(60));
            loop {
                interval.tick().await;
                guard.cleanup();
            }
        })
    }
}

impl Default for LoginAttemptGuard {
    fn default() -> Self {
        Self::from_policy(&AuthPolicy::default())
    }
}
