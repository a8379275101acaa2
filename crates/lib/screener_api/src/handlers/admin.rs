//! Admin-only principal management handlers.
//!
//! Mounted behind `require_auth` + `require_admin`.

use axum::Json;
use axum::extract::{Path, State};
use screener_core::auth::admin;
use screener_core::models::wire::{
    PrincipalListResponse, PrincipalView, RevokeSessionsResponse, SetActiveRequest,
    SetAdminRequest, SetPermissionsRequest,
};
use uuid::Uuid;

use crate::AppState;
use crate::error::AppResult;
use crate::middleware::auth::AdminActor;

/// `GET /admin/principals` — list every principal.
pub async fn list_principals_handler(
    State(state): State<AppState>,
) -> AppResult<Json<PrincipalListResponse>> {
    let principals = admin::list_principals(state.issuer.store().as_ref()).await?;
    Ok(Json(PrincipalListResponse {
        principals: principals.iter().map(PrincipalView::from).collect(),
    }))
}

/// `PATCH /admin/principals/{id}/admin` — grant or clear the admin flag.
pub async fn set_admin_handler(
    State(state): State<AppState>,
    axum::Extension(actor): axum::Extension<AdminActor>,
    Path(id): Path<Uuid>,
    Json(body): Json<SetAdminRequest>,
) -> AppResult<Json<PrincipalView>> {
    let principal =
        admin::set_admin(state.issuer.store().as_ref(), Some(actor.0.id), id, body.is_admin)
            .await?;
    Ok(Json(PrincipalView::from(&principal)))
}

/// `PATCH /admin/principals/{id}/active` — activate or deactivate.
pub async fn set_active_handler(
    State(state): State<AppState>,
    axum::Extension(actor): axum::Extension<AdminActor>,
    Path(id): Path<Uuid>,
    Json(body): Json<SetActiveRequest>,
) -> AppResult<Json<PrincipalView>> {
    let principal = admin::set_active(
        state.issuer.store().as_ref(),
        Some(actor.0.id),
        id,
        body.is_active,
    )
    .await?;
    Ok(Json(PrincipalView::from(&principal)))
}

/// `PUT /admin/principals/{id}/permissions` — replace the permitted paths.
pub async fn set_permissions_handler(
    State(state): State<AppState>,
    axum::Extension(actor): axum::Extension<AdminActor>,
    Path(id): Path<Uuid>,
    Json(body): Json<SetPermissionsRequest>,
) -> AppResult<Json<PrincipalView>> {
    let principal = admin::set_permitted_paths(
        state.issuer.store().as_ref(),
        Some(actor.0.id),
        id,
        &body.paths,
    )
    .await?;
    Ok(Json(PrincipalView::from(&principal)))
}

/// `DELETE /admin/principals/{id}/sessions` — sign a principal out everywhere.
pub async fn revoke_sessions_handler(
    State(state): State<AppState>,
    axum::Extension(actor): axum::Extension<AdminActor>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<RevokeSessionsResponse>> {
    let revoked =
        admin::revoke_sessions(state.issuer.store().as_ref(), Some(actor.0.id), id).await?;
    Ok(Json(RevokeSessionsResponse { revoked }))
}
