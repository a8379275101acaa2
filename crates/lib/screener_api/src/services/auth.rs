//! Authentication service: wire-model adapters over the credential issuer.

use std::sync::Arc;

use screener_core::auth::challenge::{ChallengeAnswer, ChallengeIssuer};
use screener_core::auth::issuer::CredentialIssuer;
use screener_core::auth::login_guard::LoginAttemptGuard;
use screener_core::auth::store::CredentialStore;
use screener_core::models::auth::AccessClaims;
use screener_core::models::wire::{
    CaptchaQuery, CaptchaResponse, LoginRequest, LogoutRequest, LogoutResponse, PrincipalView,
    RefreshRequest, RegisterRequest, TokenResponse,
};

use crate::config::ApiConfig;
use crate::error::{AppError, AppResult};

/// Wire up a credential issuer with fresh in-memory guard and challenge state.
pub fn build_issuer(store: Arc<dyn CredentialStore>, config: &ApiConfig) -> CredentialIssuer {
    CredentialIssuer::new(
        store,
        Arc::new(LoginAttemptGuard::from_policy(&config.policy)),
        Arc::new(ChallengeIssuer::from_policy(&config.policy)),
        config.policy.clone(),
        config.jwt_secret.as_bytes(),
    )
}

/// A challenge answer counts only when both the id and the response are sent.
fn challenge_answer(body: &LoginRequest) -> Option<ChallengeAnswer> {
    match (body.challenge_id, body.challenge_response.as_deref()) {
        (Some(challenge_id), Some(response)) => Some(ChallengeAnswer {
            challenge_id,
            response: response.to_string(),
        }),
        _ => None,
    }
}

/// Authenticate with login key + secret (+ challenge answer when demanded).
pub async fn login(issuer: &CredentialIssuer, body: &LoginRequest) -> AppResult<TokenResponse> {
    let answer = challenge_answer(body);
    let tokens = issuer
        .login(&body.login_key, &body.secret, answer.as_ref())
        .await?;
    Ok(tokens.into())
}

/// Register a new principal and log it in.
pub async fn register(
    issuer: &CredentialIssuer,
    body: &RegisterRequest,
) -> AppResult<TokenResponse> {
    let tokens = issuer
        .register(&body.login_key, &body.secret, body.display_name.as_deref())
        .await?;
    Ok(tokens.into())
}

/// Rotate a refresh token.
pub async fn refresh(issuer: &CredentialIssuer, body: &RefreshRequest) -> AppResult<TokenResponse> {
    let tokens = issuer.refresh(&body.refresh_token).await?;
    Ok(tokens.into())
}

/// Revoke a refresh token. Always succeeds for unknown tokens.
pub async fn logout(issuer: &CredentialIssuer, body: &LogoutRequest) -> AppResult<LogoutResponse> {
    issuer.logout(body.refresh_token.as_deref()).await?;
    Ok(LogoutResponse { success: true })
}

/// Current projection of the authenticated principal.
pub async fn me(issuer: &CredentialIssuer, claims: &AccessClaims) -> AppResult<PrincipalView> {
    let principal = issuer.current_principal(claims).await?;
    Ok(PrincipalView::from(&principal))
}

/// Issue a challenge for a login key, discarding the one it replaces.
pub fn captcha(issuer: &CredentialIssuer, query: &CaptchaQuery) -> AppResult<CaptchaResponse> {
    let login_key = query.login_key.trim();
    if login_key.is_empty() {
        return Err(AppError::Validation("loginKey is required".into()));
    }
    let challenge = issuer.challenges().issue(login_key);
    Ok(CaptchaResponse {
        challenge_id: challenge.id,
        image: challenge.image,
        expires_at: challenge.expires_at,
    })
}
