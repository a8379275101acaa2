//! Credential issuer: login, registration, refresh-token rotation, logout.
//!
//! Consults the [`LoginAttemptGuard`] and [`ChallengeIssuer`] before checking
//! a secret, and mints an access grant plus a session on success.

use std::sync::{Arc, OnceLock};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::challenge::{ChallengeAnswer, ChallengeIssuer};
use super::jwt::{mint_access_grant, verify_access_grant};
use super::login_guard::LoginAttemptGuard;
use super::password::{hash_password, verify_password};
use super::permissions::normalize_path_set;
use super::store::{CredentialStore, generate_refresh_token, hash_refresh_token};
use super::{AuthError, AuthPolicy};
use crate::models::auth::{AccessClaims, IssuedTokens, NewPrincipal, Principal};
use crate::uuid::uuidv7;

/// Issues and rotates credentials for principals held in a [`CredentialStore`].
#[derive(Clone)]
pub struct CredentialIssuer {
    store: Arc<dyn CredentialStore>,
    guard: Arc<LoginAttemptGuard>,
    challenges: Arc<ChallengeIssuer>,
    policy: AuthPolicy,
    jwt_secret: Arc<[u8]>,
    /// Hash checked when the login key is unknown, so every login pays for
    /// one bcrypt verification.
    dummy_hash: Arc<OnceLock<String>>,
}

impl CredentialIssuer {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        guard: Arc<LoginAttemptGuard>,
        challenges: Arc<ChallengeIssuer>,
        policy: AuthPolicy,
        jwt_secret: &[u8],
    ) -> Self {
        Self {
            store,
            guard,
            challenges,
            policy,
            jwt_secret: Arc::from(jwt_secret),
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    pub fn guard(&self) -> &Arc<LoginAttemptGuard> {
        &self.guard
    }

    pub fn challenges(&self) -> &Arc<ChallengeIssuer> {
        &self.challenges
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    /// Authenticate with login key + secret.
    ///
    /// When the guard demands a challenge, `challenge` must verify first;
    /// otherwise the call fails with [`AuthError::ChallengeRequired`] without
    /// touching the failure counter.
    pub async fn login(
        &self,
        login_key: &str,
        secret: &str,
        challenge: Option<&ChallengeAnswer>,
    ) -> Result<IssuedTokens, AuthError> {
        let login_key = login_key.trim();
        require_credentials(login_key, secret)?;

        if self.guard.is_challenge_required(login_key) {
            let passed = challenge
                .is_some_and(|answer| self.challenges.verify_answer(login_key, answer));
            if !passed {
                info!(login_key, "login blocked pending challenge");
                return Err(AuthError::ChallengeRequired);
            }
        }

        let record = self.store.find_principal_by_login(login_key).await?;
        let secret_matches = match &record {
            Some(r) => verify_password(secret, &r.secret_hash)?,
            None => {
                verify_password(secret, self.dummy_hash()?)?;
                false
            }
        };
        let principal = match record {
            Some(r) if secret_matches && r.principal.is_active => r.principal,
            _ => {
                let failures = self.guard.record_failure(login_key);
                warn!(login_key, failures, "login failed");
                return Err(AuthError::InvalidCredentials);
            }
        };

        self.guard.record_success(login_key);
        info!(login_key, principal_id = %principal.id, "login succeeded");
        self.open_session(principal).await
    }

    /// Register a new principal with the default permitted paths, then log
    /// it in.
    pub async fn register(
        &self,
        login_key: &str,
        secret: &str,
        display_name: Option<&str>,
    ) -> Result<IssuedTokens, AuthError> {
        let login_key = login_key.trim();
        require_credentials(login_key, secret)?;

        if self.store.find_principal_by_login(login_key).await?.is_some() {
            return Err(AuthError::AlreadyExists);
        }

        let display_name = display_name
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(login_key);
        let secret_hash = hash_password(secret, self.policy.password_cost)?;

        let principal = self
            .store
            .create_principal(NewPrincipal {
                id: uuidv7(),
                login_key: login_key.to_string(),
                display_name: display_name.to_string(),
                secret_hash,
                permitted_paths: normalize_path_set(&self.policy.default_paths),
            })
            .await?;

        info!(login_key, principal_id = %principal.id, "principal registered");
        self.open_session(principal).await
    }

    /// Exchange a refresh token for a new pair. The presented token is
    /// revoked; it never rotates again.
    pub async fn refresh(&self, refresh_token: &str) -> Result<IssuedTokens, AuthError> {
        if refresh_token.is_empty() {
            return Err(AuthError::InvalidOrExpiredToken);
        }
        let old_hash = hash_refresh_token(refresh_token);
        let new_token = generate_refresh_token();
        let new_hash = hash_refresh_token(&new_token);
        let now = Utc::now();
        let refresh_expires_at = now + self.policy.session_ttl;

        let Some(principal_id) = self
            .store
            .rotate_session(&old_hash, &new_hash, refresh_expires_at, now)
            .await?
        else {
            debug!("refresh rejected: token unknown, revoked, rotated or expired");
            return Err(AuthError::InvalidOrExpiredToken);
        };

        let principal = match self.store.get_principal(principal_id).await? {
            Some(p) if p.is_active => p,
            _ => {
                self.store.revoke_session(&new_hash).await?;
                warn!(%principal_id, "refresh rejected: principal missing or inactive");
                return Err(AuthError::InvalidOrExpiredToken);
            }
        };

        let (access_grant, access_expires_at) =
            mint_access_grant(&principal, self.policy.access_ttl, &self.jwt_secret)?;
        debug!(%principal_id, "refresh token rotated");
        Ok(IssuedTokens {
            access_grant,
            access_expires_at,
            refresh_token: new_token,
            refresh_expires_at,
            principal,
        })
    }

    /// Revoke the session behind `refresh_token`, if any. Unknown or
    /// already-revoked tokens are not an error.
    pub async fn logout(&self, refresh_token: Option<&str>) -> Result<(), AuthError> {
        if let Some(token) = refresh_token.filter(|t| !t.is_empty()) {
            let revoked = self
                .store
                .revoke_session(&hash_refresh_token(token))
                .await?;
            debug!(revoked, "logout");
        }
        Ok(())
    }

    /// Verify an access grant. Stateless: no store lookup.
    pub fn authenticate(&self, access_grant: &str) -> Result<AccessClaims, AuthError> {
        verify_access_grant(access_grant, &self.jwt_secret).ok_or(AuthError::InvalidOrExpiredToken)
    }

    /// Load the current state of the principal behind verified claims.
    /// Missing or deactivated principals are treated as an invalid grant.
    pub async fn current_principal(&self, claims: &AccessClaims) -> Result<Principal, AuthError> {
        let id = claims
            .principal_id()
            .ok_or(AuthError::InvalidOrExpiredToken)?;
        match self.store.get_principal(id).await? {
            Some(p) if p.is_active => Ok(p),
            _ => Err(AuthError::InvalidOrExpiredToken),
        }
    }

    fn dummy_hash(&self) -> Result<&str, AuthError> {
        if let Some(hash) = self.dummy_hash.get() {
            return Ok(hash);
        }
        let hash = hash_password(&generate_refresh_token(), self.policy.password_cost)?;
        Ok(self.dummy_hash.get_or_init(|| hash))
    }

    async fn open_session(&self, principal: Principal) -> Result<IssuedTokens, AuthError> {
        let refresh_token = generate_refresh_token();
        let refresh_expires_at = Utc::now() + self.policy.session_ttl;
        self.store
            .insert_session(
                &hash_refresh_token(&refresh_token),
                principal.id,
                refresh_expires_at,
            )
            .await?;
        let (access_grant, access_expires_at) =
            mint_access_grant(&principal, self.policy.access_ttl, &self.jwt_secret)?;
        Ok(IssuedTokens {
            access_grant,
            access_expires_at,
            refresh_token,
            refresh_expires_at,
            principal,
        })
    }
}

fn require_credentials(login_key: &str, secret: &str) -> Result<(), AuthError> {
    if login_key.is_empty() || secret.is_empty() {
        return Err(AuthError::ValidationError(
            "loginKey and secret are required".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::auth::memory_store::MemoryCredentialStore;

    const CODE: &str = "K7PQR";

    fn issuer() -> CredentialIssuer {
        let policy = AuthPolicy {
            password_cost: 4,
            ..AuthPolicy::default()
        };
        CredentialIssuer::new(
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(LoginAttemptGuard::from_policy(&policy)),
            Arc::new(
                ChallengeIssuer::from_policy(&policy)
                    .with_generator(Arc::new(|_| CODE.to_string())),
            ),
            policy,
            b"test-secret",
        )
    }

    #[tokio::test]
    async fn register_issues_pair_with_default_paths() {
        let issuer = issuer();
        let tokens = issuer.register("alice", "secret1", None).await.unwrap();
        assert!(!tokens.principal.is_admin);
        assert!(tokens.principal.is_active);
        assert_eq!(tokens.principal.display_name, "alice");
        assert_eq!(
            tokens.principal.permitted_paths,
            issuer.policy().default_paths
        );
        let claims = issuer.authenticate(&tokens.access_grant).unwrap();
        assert_eq!(claims.principal_id(), Some(tokens.principal.id));
        assert!(tokens.refresh_expires_at > tokens.access_expires_at);
    }

    #[tokio::test]
    async fn duplicate_registration_fails() {
        let issuer = issuer();
        issuer.register("alice", "secret1", None).await.unwrap();
        let err = issuer.register("alice", "other", None).await.unwrap_err();
        assert!(matches!(err, AuthError::AlreadyExists));
    }

    #[tokio::test]
    async fn empty_credentials_are_rejected_without_counting() {
        let issuer = issuer();
        let err = issuer.login("  ", "pw", None).await.unwrap_err();
        assert!(matches!(err, AuthError::ValidationError(_)));
        let err = issuer.login("alice", "", None).await.unwrap_err();
        assert!(matches!(err, AuthError::ValidationError(_)));
        assert_eq!(issuer.guard().failure_count("alice"), 0);
    }

    #[tokio::test]
    async fn unknown_login_counts_as_failure() {
        let issuer = issuer();
        let err = issuer.login("ghost", "pw", None).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert_eq!(issuer.guard().failure_count("ghost"), 1);
    }

    #[tokio::test]
    async fn unknown_login_still_checks_a_secret() {
        let issuer = issuer();
        assert!(issuer.dummy_hash.get().is_none());
        issuer.login("ghost", "pw", None).await.unwrap_err();
        let hash = issuer.dummy_hash.get().expect("dummy hash computed");
        assert!(hash.starts_with("$2"));
        assert!(!verify_password("pw", hash).unwrap());

        // Reused across clones and later attempts.
        let clone = issuer.clone();
        clone.login("ghost2", "pw", None).await.unwrap_err();
        assert_eq!(clone.dummy_hash.get().map(String::as_str), Some(hash.as_str()));
    }

    #[tokio::test]
    async fn challenge_gate_after_threshold() {
        let issuer = issuer();
        issuer.register("alice", "secret1", None).await.unwrap();

        for _ in 0..5 {
            let err = issuer.login("alice", "wrong", None).await.unwrap_err();
            assert!(matches!(err, AuthError::InvalidCredentials));
        }

        // Even the right secret is gated, and the counter does not move.
        let err = issuer.login("alice", "secret1", None).await.unwrap_err();
        assert!(err.requires_challenge());
        assert_eq!(issuer.guard().failure_count("alice"), 5);

        // A wrong answer is still ChallengeRequired.
        let ch = issuer.challenges().issue("alice");
        let wrong = ChallengeAnswer {
            challenge_id: ch.id,
            response: "NOPE0".into(),
        };
        let err = issuer
            .login("alice", "secret1", Some(&wrong))
            .await
            .unwrap_err();
        assert!(err.requires_challenge());
        assert_eq!(issuer.guard().failure_count("alice"), 5);

        let ch = issuer.challenges().issue("alice");
        let right = ChallengeAnswer {
            challenge_id: ch.id,
            response: CODE.to_lowercase(),
        };
        issuer
            .login("alice", "secret1", Some(&right))
            .await
            .unwrap();
        assert!(!issuer.guard().is_challenge_required("alice"));
        assert_eq!(issuer.guard().failure_count("alice"), 0);
    }

    #[tokio::test]
    async fn challenge_solved_for_another_key_does_not_unlock() {
        let issuer = issuer();
        issuer.register("alice", "secret1", None).await.unwrap();
        for _ in 0..5 {
            let _ = issuer.login("alice", "wrong", None).await;
        }
        let ch = issuer.challenges().issue("mallory");
        let answer = ChallengeAnswer {
            challenge_id: ch.id,
            response: CODE.into(),
        };
        let err = issuer
            .login("alice", "secret1", Some(&answer))
            .await
            .unwrap_err();
        assert!(err.requires_challenge());
        assert_eq!(issuer.guard().failure_count("alice"), 5);
    }

    #[tokio::test]
    async fn correct_challenge_with_wrong_secret_counts_once() {
        let issuer = issuer();
        issuer.register("alice", "secret1", None).await.unwrap();
        for _ in 0..5 {
            let _ = issuer.login("alice", "wrong", None).await;
        }
        let ch = issuer.challenges().issue("alice");
        let answer = ChallengeAnswer {
            challenge_id: ch.id,
            response: CODE.into(),
        };
        let err = issuer
            .login("alice", "wrong", Some(&answer))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert_eq!(issuer.guard().failure_count("alice"), 6);
        // The consumed challenge cannot be replayed.
        let err = issuer
            .login("alice", "secret1", Some(&answer))
            .await
            .unwrap_err();
        assert!(err.requires_challenge());
    }

    #[tokio::test]
    async fn refresh_rotates_and_old_token_dies() {
        let issuer = issuer();
        let first = issuer.register("alice", "secret1", None).await.unwrap();
        let second = issuer.refresh(&first.refresh_token).await.unwrap();
        assert_ne!(second.refresh_token, first.refresh_token);

        let err = issuer.refresh(&first.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredToken));

        issuer.refresh(&second.refresh_token).await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_refreshes_have_one_winner() {
        let issuer = issuer();
        let tokens = issuer.register("alice", "secret1", None).await.unwrap();
        let attempts = futures::future::join_all(
            (0..8).map(|_| issuer.refresh(&tokens.refresh_token)),
        )
        .await;
        let ok = attempts.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok, 1);
        assert!(
            attempts
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(|e| matches!(e, AuthError::InvalidOrExpiredToken))
        );
    }

    #[tokio::test]
    async fn logout_is_idempotent_and_kills_refresh() {
        let issuer = issuer();
        let tokens = issuer.register("alice", "secret1", None).await.unwrap();
        issuer.logout(Some(&tokens.refresh_token)).await.unwrap();
        issuer.logout(Some(&tokens.refresh_token)).await.unwrap();
        issuer.logout(Some("garbage")).await.unwrap();
        issuer.logout(None).await.unwrap();
        let err = issuer.refresh(&tokens.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredToken));
    }

    #[tokio::test]
    async fn inactive_principal_cannot_login_or_refresh() {
        let issuer = issuer();
        let tokens = issuer.register("alice", "secret1", None).await.unwrap();
        issuer
            .store()
            .set_active(tokens.principal.id, false)
            .await
            .unwrap();

        let err = issuer.login("alice", "secret1", None).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        let err = issuer.refresh(&tokens.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredToken));

        let claims = issuer.authenticate(&tokens.access_grant).unwrap();
        let err = issuer.current_principal(&claims).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredToken));
    }

    #[tokio::test]
    async fn expired_access_grant_is_rejected() {
        let mut issuer = issuer();
        issuer.policy.access_ttl = Duration::seconds(-5);
        let tokens = issuer.register("alice", "secret1", None).await.unwrap();
        let err = issuer.authenticate(&tokens.access_grant).unwrap_err();
        assert!(matches!(err, AuthError::InvalidOrExpiredToken));
    }

    #[tokio::test]
    async fn display_name_is_used_when_given() {
        let issuer = issuer();
        let tokens = issuer
            .register(" bob ", "pw", Some("Bob B."))
            .await
            .unwrap();
        assert_eq!(tokens.principal.login_key, "bob");
        assert_eq!(tokens.principal.display_name, "Bob B.");
        issuer.login("bob", "pw", None).await.unwrap();
    }
}
