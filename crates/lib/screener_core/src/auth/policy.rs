//! Tunable authentication policy.

use chrono::Duration;

use super::permissions::DEFAULT_PERMITTED_PATHS;

/// Access grant lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;

/// Session (refresh token) lifetime: 30 days.
pub const DEFAULT_SESSION_TTL_DAYS: i64 = 30;

/// Consecutive failures before a challenge is demanded.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Failure counters are forgotten after this much inactivity: 15 minutes.
pub const DEFAULT_FAILURE_WINDOW_SECS: i64 = 15 * 60;

/// Challenge lifetime: 5 minutes.
pub const DEFAULT_CHALLENGE_TTL_SECS: i64 = 5 * 60;

/// Characters in a challenge code.
pub const DEFAULT_CHALLENGE_LENGTH: usize = 5;

/// bcrypt cost factor.
pub const DEFAULT_PASSWORD_COST: u32 = 10;

/// Lifetimes, thresholds and defaults consumed by the credential issuer and
/// its collaborators.
#[derive(Debug, Clone)]
pub struct AuthPolicy {
    pub access_ttl: Duration,
    pub session_ttl: Duration,
    pub failure_threshold: u32,
    pub failure_window: Duration,
    pub challenge_ttl: Duration,
    pub challenge_length: usize,
    pub password_cost: u32,
    /// Paths granted to every newly registered principal.
    pub default_paths: Vec<String>,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            access_ttl: Duration::seconds(DEFAULT_ACCESS_TTL_SECS),
            session_ttl: Duration::days(DEFAULT_SESSION_TTL_DAYS),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            failure_window: Duration::seconds(DEFAULT_FAILURE_WINDOW_SECS),
            challenge_ttl: Duration::seconds(DEFAULT_CHALLENGE_TTL_SECS),
            challenge_length: DEFAULT_CHALLENGE_LENGTH,
            password_cost: DEFAULT_PASSWORD_COST,
            default_paths: DEFAULT_PERMITTED_PATHS
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}
