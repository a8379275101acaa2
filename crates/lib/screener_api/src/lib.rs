//! # screener_api
//!
//! HTTP API for Screener authentication and sessions.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, patch, post, put};
use screener_core::auth::issuer::CredentialIssuer;
use screener_core::auth::store::CredentialStore;
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::handlers::{admin, auth, permissions};

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Credential issuer, holding the store, guard and challenge state.
    pub issuer: CredentialIssuer,
    /// API configuration.
    pub config: ApiConfig,
}

impl AppState {
    /// Build state over `store` with guard and challenge state from `config`.
    pub fn new(store: Arc<dyn CredentialStore>, config: ApiConfig) -> Self {
        let issuer = services::auth::build_issuer(store, &config);
        Self { issuer, config }
    }
}

/// Run embedded database migrations.
///
/// Delegates to `screener_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    screener_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::POST_LOGIN, post(auth::login_handler))
        .route(routes::POST_REGISTER, post(auth::register_handler))
        .route(routes::POST_REFRESH_TOKEN, post(auth::refresh_handler))
        .route(routes::POST_LOGOUT, post(auth::logout_handler))
        .route(routes::GET_CAPTCHA, get(auth::captcha_handler))
        .route(routes::GET_PERMISSIONS_CHECK, get(permissions::check_handler));

    // Protected routes (require a valid access grant)
    let protected = Router::new()
        .route(routes::GET_ME, get(auth::me_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    // Admin routes: require_auth runs first (outermost), then require_admin.
    let admin = Router::new()
        .route(routes::GET_ADMIN_PRINCIPALS, get(admin::list_principals_handler))
        .route(
            routes::PATCH_ADMIN_PRINCIPAL_ADMIN,
            patch(admin::set_admin_handler),
        )
        .route(
            routes::PATCH_ADMIN_PRINCIPAL_ACTIVE,
            patch(admin::set_active_handler),
        )
        .route(
            routes::PUT_ADMIN_PRINCIPAL_PERMISSIONS,
            put(admin::set_permissions_handler),
        )
        .route(
            routes::DELETE_ADMIN_PRINCIPAL_SESSIONS,
            delete(admin::revoke_sessions_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_admin,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .merge(admin)
        .layer(cors)
        .with_state(state)
}
