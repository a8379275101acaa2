//! Permission check handler.

use axum::Json;
use axum::extract::Query;
use screener_core::auth::permissions::{can_access, normalize_path};
use screener_core::models::wire::{PermissionCheckQuery, PermissionCheckResponse};

use crate::middleware::auth::OptionalUser;

/// `GET /permissions/check?path=…` — evaluate the access policy for the
/// caller's grant (or an anonymous caller) without a store lookup.
pub async fn check_handler(
    OptionalUser(claims): OptionalUser,
    Query(query): Query<PermissionCheckQuery>,
) -> Json<PermissionCheckResponse> {
    let allowed = can_access(claims.as_ref(), &query.path);
    Json(PermissionCheckResponse {
        path: normalize_path(&query.path).to_string(),
        allowed,
    })
}
