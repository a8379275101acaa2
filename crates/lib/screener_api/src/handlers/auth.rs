//! Authentication request handlers.

use axum::Json;
use axum::extract::{Query, State};
use screener_core::models::wire::{
    CaptchaQuery, CaptchaResponse, LoginRequest, LogoutRequest, LogoutResponse, PrincipalView,
    RefreshRequest, RegisterRequest, TokenResponse,
};

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AuthenticatedUser;
use crate::services::auth;

/// `POST /login` — authenticate with login key + secret.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> AppResult<Json<TokenResponse>> {
    let resp = auth::login(&state.issuer, &body).await?;
    Ok(Json(resp))
}

/// `POST /register` — create a new principal.
pub async fn register_handler(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> AppResult<Json<TokenResponse>> {
    let resp = auth::register(&state.issuer, &body).await?;
    Ok(Json(resp))
}

/// `POST /refresh-token` — exchange a refresh token for a new token pair.
pub async fn refresh_handler(
    State(state): State<AppState>,
    Json(body): Json<RefreshRequest>,
) -> AppResult<Json<TokenResponse>> {
    let resp = auth::refresh(&state.issuer, &body).await?;
    Ok(Json(resp))
}

/// `POST /logout` — revoke a refresh token.
pub async fn logout_handler(
    State(state): State<AppState>,
    Json(body): Json<LogoutRequest>,
) -> AppResult<Json<LogoutResponse>> {
    let resp = auth::logout(&state.issuer, &body).await?;
    Ok(Json(resp))
}

/// `GET /me` — the authenticated principal.
pub async fn me_handler(
    State(state): State<AppState>,
    axum::Extension(user): axum::Extension<AuthenticatedUser>,
) -> AppResult<Json<PrincipalView>> {
    let resp = auth::me(&state.issuer, &user.0).await?;
    Ok(Json(resp))
}

/// `GET /captcha` — issue a login challenge.
pub async fn captcha_handler(
    State(state): State<AppState>,
    Query(query): Query<CaptchaQuery>,
) -> AppResult<Json<CaptchaResponse>> {
    let resp = auth::captcha(&state.issuer, &query)?;
    Ok(Json(resp))
}
