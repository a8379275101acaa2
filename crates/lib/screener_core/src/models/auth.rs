//! Authentication domain models.
//!
//! These are internal domain models, distinct from the camelCase wire
//! models in [`super::wire`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An authenticated entity: one registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub id: Uuid,
    pub login_key: String,
    pub display_name: String,
    pub is_admin: bool,
    pub is_active: bool,
    /// Ordered, duplicate-free set of logical paths.
    pub permitted_paths: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Principal together with its credential hash (for internal auth flows).
#[derive(Debug, Clone)]
pub struct PrincipalWithSecret {
    pub principal: Principal,
    pub secret_hash: String,
}

/// Insert payload for a new principal.
#[derive(Debug, Clone)]
pub struct NewPrincipal {
    pub id: Uuid,
    pub login_key: String,
    pub display_name: String,
    pub secret_hash: String,
    pub permitted_paths: Vec<String>,
}

/// Refresh-token session record.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub id: Uuid,
    pub principal_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    /// Whether this session can still be exchanged at `now`.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// JWT claims embedded in access grants.
///
/// Carries enough to authorize a request without a store lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    /// Subject: principal id.
    pub sub: String,
    /// Login key at the time of issue.
    pub login: String,
    /// Display name at the time of issue.
    pub name: String,
    /// Admin flag at the time of issue.
    pub admin: bool,
    /// Permitted logical paths at the time of issue.
    pub paths: Vec<String>,
    /// Expiry (unix timestamp).
    pub exp: i64,
    /// Issued at (unix timestamp).
    pub iat: i64,
}

impl AccessClaims {
    /// Parse the subject back into a principal id.
    pub fn principal_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

/// Result of a successful login, registration or rotation.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_grant: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
    pub principal: Principal,
}
