//! Bearer authentication and the request-side permission guard.

use axum::extract::{FromRequestParts, Request, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use screener_core::auth::permissions::{ADMIN_ONLY_PATH, PermissionSubject, can_access};
use screener_core::models::auth::{AccessClaims, Principal};
use tracing::debug;

use crate::AppState;
use crate::error::{AppError, AppResult};

/// Verified access-grant claims, stored in request extensions.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub AccessClaims);

/// The admin principal behind an admin-only request, freshly loaded.
#[derive(Debug, Clone)]
pub struct AdminActor(pub Principal);

/// Extract the bearer token. `Ok(None)` when no `Authorization` header is sent.
fn bearer_token(headers: &HeaderMap) -> AppResult<Option<&str>> {
    let Some(header) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Malformed authorization header".into()))?;
    value
        .strip_prefix("Bearer ")
        .map(Some)
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization scheme".into()))
}

fn verify(state: &AppState, token: &str) -> AppResult<AccessClaims> {
    state.issuer.authenticate(token).map_err(|e| {
        debug!("access grant rejected");
        AppError::from(e)
    })
}

/// Axum middleware: extracts `Authorization: Bearer <token>`, verifies the
/// access grant, and injects [`AuthenticatedUser`] into request extensions.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())?
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;
    let claims = verify(&state, token)?;
    request.extensions_mut().insert(AuthenticatedUser(claims));
    Ok(next.run(request).await)
}

/// Axum middleware, layered inside [`require_auth`]: the caller's current
/// principal must pass the admin-only path check. Injects [`AdminActor`].
pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let claims = request
        .extensions()
        .get::<AuthenticatedUser>()
        .map(|u| u.0.clone())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;
    let principal = state.issuer.current_principal(&claims).await?;
    authorize_path(Some(&principal), ADMIN_ONLY_PATH)?;
    request.extensions_mut().insert(AdminActor(principal));
    Ok(next.run(request).await)
}

/// Request guard: fail with 403 unless `subject` may reach `path`.
pub fn authorize_path<S: PermissionSubject + ?Sized>(
    subject: Option<&S>,
    path: &str,
) -> AppResult<()> {
    if can_access(subject, path) {
        Ok(())
    } else {
        debug!(path, "permission denied");
        Err(AppError::Forbidden(format!("Access to {path} denied")))
    }
}

/// Extractor for endpoints open to anonymous callers. A present but invalid
/// bearer token is still rejected with 401.
#[derive(Debug, Clone)]
pub struct OptionalUser(pub Option<AccessClaims>);

impl FromRequestParts<AppState> for OptionalUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match bearer_token(&parts.headers)? {
            Some(token) => Ok(OptionalUser(Some(verify(state, token)?))),
            None => Ok(OptionalUser(None)),
        }
    }
}
