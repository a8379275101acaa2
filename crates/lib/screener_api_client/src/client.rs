//! Typed reqwest client for the auth API.

use reqwest::{RequestBuilder, Response};
use screener_core::models::wire::{
    CaptchaResponse, ErrorResponse, LoginRequest, LogoutRequest, LogoutResponse,
    PermissionCheckResponse, PrincipalListResponse, PrincipalView, RefreshRequest,
    RegisterRequest, RevokeSessionsResponse, SetActiveRequest, SetAdminRequest,
    SetPermissionsRequest, TokenResponse,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::error::ClientError;

/// HTTP client bound to one API base URL. Cheap to clone.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: &str) -> Result<Self, ClientError> {
        Ok(Self {
            http,
            base_url: Url::parse(base_url)?,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn login(&self, body: &LoginRequest) -> Result<TokenResponse, ClientError> {
        self.send_json(self.http.post(self.url("/login")?), body).await
    }

    pub async fn register(&self, body: &RegisterRequest) -> Result<TokenResponse, ClientError> {
        self.send_json(self.http.post(self.url("/register")?), body)
            .await
    }

    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ClientError> {
        let body = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        self.send_json(self.http.post(self.url("/refresh-token")?), &body)
            .await
    }

    pub async fn logout(&self, refresh_token: Option<&str>) -> Result<LogoutResponse, ClientError> {
        let body = LogoutRequest {
            refresh_token: refresh_token.map(str::to_string),
        };
        self.send_json(self.http.post(self.url("/logout")?), &body)
            .await
    }

    pub async fn me(&self, access_grant: &str) -> Result<PrincipalView, ClientError> {
        let req = self.http.get(self.url("/me")?).bearer_auth(access_grant);
        decode(req.send().await?).await
    }

    /// Fetch a fresh challenge for `login_key`. Any challenge still pending
    /// for that key stops verifying.
    pub async fn captcha(&self, login_key: &str) -> Result<CaptchaResponse, ClientError> {
        let req = self
            .http
            .get(self.url("/captcha")?)
            .query(&[("loginKey", login_key)]);
        decode(req.send().await?).await
    }

    /// Ask the server whether the caller (anonymous without a grant) may open `path`.
    pub async fn check_permission(
        &self,
        access_grant: Option<&str>,
        path: &str,
    ) -> Result<PermissionCheckResponse, ClientError> {
        let mut req = self
            .http
            .get(self.url("/permissions/check")?)
            .query(&[("path", path)]);
        if let Some(grant) = access_grant {
            req = req.bearer_auth(grant);
        }
        decode(req.send().await?).await
    }

    // -- admin --

    pub async fn list_principals(
        &self,
        access_grant: &str,
    ) -> Result<PrincipalListResponse, ClientError> {
        let req = self
            .http
            .get(self.url("/admin/principals")?)
            .bearer_auth(access_grant);
        decode(req.send().await?).await
    }

    pub async fn set_admin(
        &self,
        access_grant: &str,
        id: Uuid,
        is_admin: bool,
    ) -> Result<PrincipalView, ClientError> {
        let req = self
            .http
            .patch(self.url(&format!("/admin/principals/{id}/admin"))?)
            .bearer_auth(access_grant);
        self.send_json(req, &SetAdminRequest { is_admin }).await
    }

    pub async fn set_active(
        &self,
        access_grant: &str,
        id: Uuid,
        is_active: bool,
    ) -> Result<PrincipalView, ClientError> {
        let req = self
            .http
            .patch(self.url(&format!("/admin/principals/{id}/active"))?)
            .bearer_auth(access_grant);
        self.send_json(req, &SetActiveRequest { is_active }).await
    }

    pub async fn set_permissions(
        &self,
        access_grant: &str,
        id: Uuid,
        paths: Vec<String>,
    ) -> Result<PrincipalView, ClientError> {
        let req = self
            .http
            .put(self.url(&format!("/admin/principals/{id}/permissions"))?)
            .bearer_auth(access_grant);
        self.send_json(req, &SetPermissionsRequest { paths }).await
    }

    pub async fn revoke_sessions(
        &self,
        access_grant: &str,
        id: Uuid,
    ) -> Result<RevokeSessionsResponse, ClientError> {
        let req = self
            .http
            .delete(self.url(&format!("/admin/principals/{id}/sessions"))?)
            .bearer_auth(access_grant);
        decode(req.send().await?).await
    }

    fn url(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base_url.join(path)?)
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        body: &B,
    ) -> Result<T, ClientError> {
        decode(req.json(body).send().await?).await
    }
}

/// Decode a success body, or turn an error body into a [`ClientError`].
async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp.json().await?);
    }
    let bytes = resp.bytes().await?;
    debug!(status = status.as_u16(), "API call failed");
    match serde_json::from_slice::<ErrorResponse>(&bytes) {
        Ok(body) => Err(ClientError::from_response(status.as_u16(), body)),
        Err(_) => Err(ClientError::Api {
            status: status.as_u16(),
            code: "unknown".into(),
            message: String::from_utf8_lossy(&bytes).into_owned(),
        }),
    }
}
