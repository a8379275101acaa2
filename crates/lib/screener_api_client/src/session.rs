//! An authenticated client session.

use std::future::Future;
use std::sync::Arc;

use screener_core::models::wire::{
    LoginRequest, PermissionCheckResponse, PrincipalListResponse, PrincipalView, RegisterRequest,
};
use tracing::debug;
use uuid::Uuid;

use crate::client::ApiClient;
use crate::coordinator::{RefreshCoordinator, TokenRefresher};
use crate::error::ClientError;
use crate::guard::{NavigationDecision, check_navigation};

/// Runs authorized calls, rotating the access grant at most once per call
/// when the server reports it expired.
pub struct AuthSession {
    client: ApiClient,
    coordinator: RefreshCoordinator,
}

impl AuthSession {
    pub fn new(client: ApiClient) -> Self {
        let refresher: Arc<dyn TokenRefresher> = Arc::new(client.clone());
        Self::with_refresher(client, refresher)
    }

    /// Use a custom rotation backend.
    pub fn with_refresher(client: ApiClient, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            client,
            coordinator: RefreshCoordinator::new(refresher),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Principal from the latest token pair, if logged in.
    pub fn principal(&self) -> Option<PrincipalView> {
        self.coordinator.principal()
    }

    pub async fn login(&self, body: &LoginRequest) -> Result<PrincipalView, ClientError> {
        let tokens = self.client.login(body).await?;
        self.coordinator.install(&tokens);
        Ok(tokens.principal)
    }

    pub async fn register(&self, body: &RegisterRequest) -> Result<PrincipalView, ClientError> {
        let tokens = self.client.register(body).await?;
        self.coordinator.install(&tokens);
        Ok(tokens.principal)
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        self.coordinator.logout().await
    }

    /// Run `call` with the current access grant. On an expired grant, rotate
    /// (or join the rotation already in flight) and retry once. A second
    /// expiry, or a failed rotation, ends the session.
    pub async fn execute<T, F, Fut>(&self, call: F) -> Result<T, ClientError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let grant = self
            .coordinator
            .access_grant()
            .ok_or(ClientError::ReauthenticationRequired)?;
        match call(grant.clone()).await {
            Err(err) if err.is_expired_grant() => {
                debug!("access grant rejected; renewing");
                let fresh = self.coordinator.renew(&grant).await?;
                match call(fresh).await {
                    Err(err) if err.is_expired_grant() => {
                        Err(ClientError::ReauthenticationRequired)
                    }
                    other => other,
                }
            }
            other => other,
        }
    }

    pub async fn me(&self) -> Result<PrincipalView, ClientError> {
        let client = &self.client;
        self.execute(move |grant| async move { client.me(&grant).await })
            .await
    }

    /// Server-side permission check with the session's grant.
    pub async fn check_permission(&self, path: &str) -> Result<PermissionCheckResponse, ClientError> {
        let client = &self.client;
        self.execute(move |grant| async move { client.check_permission(Some(&grant), path).await })
            .await
    }

    pub async fn list_principals(&self) -> Result<PrincipalListResponse, ClientError> {
        let client = &self.client;
        self.execute(move |grant| async move { client.list_principals(&grant).await })
            .await
    }

    pub async fn set_permissions(
        &self,
        id: Uuid,
        paths: &[String],
    ) -> Result<PrincipalView, ClientError> {
        let client = &self.client;
        self.execute(move |grant| async move {
            client.set_permissions(&grant, id, paths.to_vec()).await
        })
        .await
    }

    /// Page-guard decision for `path` based on the local principal snapshot.
    pub fn navigate(&self, path: &str) -> NavigationDecision {
        check_navigation(self.principal().as_ref(), path)
    }
}
