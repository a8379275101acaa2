//! In-memory credential store.
//!
//! Used for tests and `--memory-store` development runs. Nothing survives a
//! restart.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::AuthError;
use super::store::CredentialStore;
use crate::models::auth::{NewPrincipal, Principal, PrincipalWithSecret, SessionRecord};
use crate::uuid::uuidv7;

#[derive(Debug, Default)]
struct Principals {
    by_id: HashMap<Uuid, PrincipalWithSecret>,
    by_login: HashMap<String, Uuid>,
}

/// Principals behind one `RwLock`; sessions in a `DashMap` keyed by token
/// hash so that check-and-revoke happens under the entry's shard lock.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    principals: RwLock<Principals>,
    sessions: DashMap<String, SessionRecord>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Drop revoked and expired sessions. A missing session is treated the
    /// same as a dead one by every lookup.
    pub fn cleanup(&self) {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.is_live(now));
        let evicted = before.saturating_sub(self.sessions.len());
        if evicted > 0 {
            debug!(evicted, "evicted dead sessions");
        }
    }

    /// Spawn a periodic cleanup task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(StdDuration::from_secs(60));
            loop {
                interval.tick().await;
                store.cleanup();
            }
        })
    }

    async fn update_principal(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut Principal),
    ) -> Result<Option<Principal>, AuthError> {
        let mut guard = self.principals.write().await;
        Ok(guard.by_id.get_mut(&id).map(|entry| {
            apply(&mut entry.principal);
            entry.principal.clone()
        }))
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_principal_by_login(
        &self,
        login_key: &str,
    ) -> Result<Option<PrincipalWithSecret>, AuthError> {
        let guard = self.principals.read().await;
        Ok(guard
            .by_login
            .get(login_key)
            .and_then(|id| guard.by_id.get(id))
            .cloned())
    }

    async fn get_principal(&self, id: Uuid) -> Result<Option<Principal>, AuthError> {
        let guard = self.principals.read().await;
        Ok(guard.by_id.get(&id).map(|p| p.principal.clone()))
    }

    async fn create_principal(&self, new: NewPrincipal) -> Result<Principal, AuthError> {
        let mut guard = self.principals.write().await;
        if guard.by_login.contains_key(&new.login_key) {
            return Err(AuthError::AlreadyExists);
        }
        let principal = Principal {
            id: new.id,
            login_key: new.login_key,
            display_name: new.display_name,
            is_admin: false,
            is_active: true,
            permitted_paths: new.permitted_paths,
            created_at: Utc::now(),
        };
        guard.by_login.insert(principal.login_key.clone(), principal.id);
        guard.by_id.insert(
            principal.id,
            PrincipalWithSecret {
                principal: principal.clone(),
                secret_hash: new.secret_hash,
            },
        );
        Ok(principal)
    }

    async fn list_principals(&self) -> Result<Vec<Principal>, AuthError> {
        let guard = self.principals.read().await;
        let mut all: Vec<Principal> = guard.by_id.values().map(|p| p.principal.clone()).collect();
        all.sort_by_key(|p| (p.created_at, p.id));
        Ok(all)
    }

    async fn set_admin(&self, id: Uuid, is_admin: bool) -> Result<Option<Principal>, AuthError> {
        self.update_principal(id, |p| p.is_admin = is_admin).await
    }

    async fn set_active(
        &self,
        id: Uuid,
        is_active: bool,
    ) -> Result<Option<Principal>, AuthError> {
        self.update_principal(id, |p| p.is_active = is_active).await
    }

    async fn set_permitted_paths(
        &self,
        id: Uuid,
        paths: Vec<String>,
    ) -> Result<Option<Principal>, AuthError> {
        self.update_principal(id, |p| p.permitted_paths = paths).await
    }

    async fn insert_session(
        &self,
        token_hash: &str,
        principal_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        self.sessions.insert(
            token_hash.to_string(),
            SessionRecord {
                id: uuidv7(),
                principal_id,
                created_at: Utc::now(),
                expires_at,
                revoked_at: None,
            },
        );
        Ok(())
    }

    async fn rotate_session(
        &self,
        old_hash: &str,
        new_hash: &str,
        new_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, AuthError> {
        // The shard write lock is held from the liveness check to the revoke.
        let principal_id = {
            let Some(mut old) = self.sessions.get_mut(old_hash) else {
                return Ok(None);
            };
            if !old.is_live(now) {
                return Ok(None);
            }
            old.revoked_at = Some(now);
            old.principal_id
        };
        self.insert_session(new_hash, principal_id, new_expires_at)
            .await?;
        Ok(Some(principal_id))
    }

    async fn revoke_session(&self, token_hash: &str) -> Result<bool, AuthError> {
        let Some(mut session) = self.sessions.get_mut(token_hash) else {
            return Ok(false);
        };
        if session.revoked_at.is_some() {
            return Ok(false);
        }
        session.revoked_at = Some(Utc::now());
        Ok(true)
    }

    async fn revoke_all_sessions(&self, principal_id: Uuid) -> Result<u64, AuthError> {
        let now = Utc::now();
        let mut revoked = 0;
        for mut session in self.sessions.iter_mut() {
            if session.principal_id == principal_id && session.revoked_at.is_none() {
                session.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }
}
