//! Credential store: principals, permission sets and refresh-token sessions.
//!
//! Pure data access, no policy. Refresh tokens only ever reach the store as
//! SHA-256 hex digests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::AuthError;
use crate::models::auth::{NewPrincipal, Principal, PrincipalWithSecret};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_principal_by_login(
        &self,
        login_key: &str,
    ) -> Result<Option<PrincipalWithSecret>, AuthError>;

    async fn get_principal(&self, id: Uuid) -> Result<Option<Principal>, AuthError>;

    /// Insert a principal. Fails with [`AuthError::AlreadyExists`] when the
    /// login key is taken.
    async fn create_principal(&self, new: NewPrincipal) -> Result<Principal, AuthError>;

    /// All principals, oldest first.
    async fn list_principals(&self) -> Result<Vec<Principal>, AuthError>;

    async fn set_admin(&self, id: Uuid, is_admin: bool) -> Result<Option<Principal>, AuthError>;

    async fn set_active(&self, id: Uuid, is_active: bool)
    -> Result<Option<Principal>, AuthError>;

    async fn set_permitted_paths(
        &self,
        id: Uuid,
        paths: Vec<String>,
    ) -> Result<Option<Principal>, AuthError>;

    async fn insert_session(
        &self,
        token_hash: &str,
        principal_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError>;

    /// Revoke the live session `old_hash` and insert `new_hash` for the same
    /// principal, as one atomic step. Returns the owning principal id, or
    /// `None` if `old_hash` was unknown, revoked or expired at `now`.
    ///
    /// Of any number of concurrent calls with the same `old_hash`, at most
    /// one returns `Some`.
    async fn rotate_session(
        &self,
        old_hash: &str,
        new_hash: &str,
        new_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, AuthError>;

    /// Revoke one session. Returns whether a live session was revoked.
    async fn revoke_session(&self, token_hash: &str) -> Result<bool, AuthError>;

    /// Revoke every live session of a principal. Returns the count.
    async fn revoke_all_sessions(&self, principal_id: Uuid) -> Result<u64, AuthError>;
}

/// Generate a cryptographically random refresh token (64 alphanumeric chars).
pub fn generate_refresh_token() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

/// SHA-256 hash a refresh token for storage.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
