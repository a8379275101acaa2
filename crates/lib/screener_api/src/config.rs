//! API server configuration.

use std::str::FromStr;

use chrono::Duration;
use screener_core::auth::AuthPolicy;
use screener_core::auth::jwt::resolve_jwt_secret;
use tracing::warn;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// JWT signing secret.
    pub jwt_secret: String,
    /// Token lifetimes, failure threshold and challenge settings.
    pub policy: AuthPolicy,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                     | Default                              |
    /// |------------------------------|--------------------------------------|
    /// | `BIND_ADDR`                  | `127.0.0.1:3100`                     |
    /// | `DATABASE_URL`               | `postgres://localhost:5432/screener` |
    /// | `JWT_SECRET` / `AUTH_SECRET` | generated & persisted to file        |
    /// | `ACCESS_TOKEN_TTL_SECS`      | `900`                                |
    /// | `REFRESH_TOKEN_TTL_DAYS`     | `30`                                 |
    /// | `LOGIN_FAILURE_THRESHOLD`    | `5`                                  |
    /// | `LOGIN_FAILURE_WINDOW_SECS`  | `900`                                |
    /// | `CAPTCHA_TTL_SECS`           | `300`                                |
    /// | `BCRYPT_COST`                | `10`                                 |
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3100".into()),
            pg_connection_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/screener".into()),
            jwt_secret: resolve_jwt_secret(),
            policy: policy_from_env(),
        }
    }
}

/// Build an [`AuthPolicy`] from environment overrides on top of the defaults.
pub fn policy_from_env() -> AuthPolicy {
    let defaults = AuthPolicy::default();
    AuthPolicy {
        access_ttl: env_parse("ACCESS_TOKEN_TTL_SECS")
            .map(Duration::seconds)
            .unwrap_or(defaults.access_ttl),
        session_ttl: env_parse("REFRESH_TOKEN_TTL_DAYS")
            .map(Duration::days)
            .unwrap_or(defaults.session_ttl),
        failure_threshold: env_parse("LOGIN_FAILURE_THRESHOLD")
            .unwrap_or(defaults.failure_threshold),
        failure_window: env_parse("LOGIN_FAILURE_WINDOW_SECS")
            .map(Duration::seconds)
            .unwrap_or(defaults.failure_window),
        challenge_ttl: env_parse("CAPTCHA_TTL_SECS")
            .map(Duration::seconds)
            .unwrap_or(defaults.challenge_ttl),
        password_cost: env_parse("BCRYPT_COST").unwrap_or(defaults.password_cost),
        ..defaults
    }
}

/// Parse an environment variable, ignoring (with a warning) unparsable values.
fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(name, value = %raw, "ignoring unparsable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_overrides_keep_defaults() {
        let policy = policy_from_env();
        let defaults = AuthPolicy::default();
        if std::env::var("LOGIN_FAILURE_THRESHOLD").is_err() {
            assert_eq!(policy.failure_threshold, defaults.failure_threshold);
        }
        assert_eq!(policy.default_paths, defaults.default_paths);
    }

    #[test]
    fn env_parse_rejects_garbage() {
        assert_eq!(env_parse::<u32>("SCREENER_TEST_UNSET_VARIABLE"), None);
    }
}
