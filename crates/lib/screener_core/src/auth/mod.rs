//! Authentication and session lifecycle.
//!
//! Password hashing, access grants, the credential store, the login-attempt
//! guard, the challenge issuer, the credential issuer and the permission
//! authorizer. Shared by `screener_api` (server side) and
//! `screener_api_client` (page guard).

pub mod admin;
pub mod challenge;
pub mod issuer;
pub mod jwt;
pub mod login_guard;
pub mod memory_store;
pub mod password;
pub mod permissions;
pub mod policy;
#[cfg(feature = "postgres")]
pub mod queries;
pub mod store;

use thiserror::Error;

pub use policy::AuthPolicy;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown login key, inactive principal or wrong secret.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Too many recent failures; a challenge response must accompany the login.
    #[error("Challenge required")]
    ChallengeRequired,

    #[error("Login key already registered")]
    AlreadyExists,

    /// Refresh token or access grant is unknown, revoked, rotated or expired.
    #[error("Invalid or expired token")]
    InvalidOrExpiredToken,

    /// Permission check failed.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    DbError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Whether the caller can recover by supplying a challenge response.
    pub fn requires_challenge(&self) -> bool {
        matches!(self, AuthError::ChallengeRequired)
    }
}
