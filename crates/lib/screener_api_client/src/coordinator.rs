//! Single-flight rotation of the access grant.
//!
//! When a call fails because its access grant expired, the first caller to
//! notice becomes the leader and rotates the refresh token. Callers arriving
//! while that rotation is in flight are queued and receive the leader's
//! outcome; they never issue a second rotation. A failed rotation is never
//! retried: every queued caller is told to re-authenticate.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use screener_core::models::wire::{PrincipalView, TokenResponse};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::client::ApiClient;
use crate::error::ClientError;

/// The two server calls the coordinator needs.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Exchange `refresh_token` for a new pair.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ClientError>;

    /// Revoke `refresh_token` server-side.
    async fn revoke(&self, refresh_token: &str) -> Result<(), ClientError>;
}

#[async_trait]
impl TokenRefresher for ApiClient {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ClientError> {
        ApiClient::refresh(self, refresh_token).await
    }

    async fn revoke(&self, refresh_token: &str) -> Result<(), ClientError> {
        self.logout(Some(refresh_token)).await.map(|_| ())
    }
}

#[derive(Clone, Debug)]
struct Credentials {
    access_grant: String,
    refresh_token: String,
    principal: PrincipalView,
}

impl From<&TokenResponse> for Credentials {
    fn from(t: &TokenResponse) -> Self {
        Self {
            access_grant: t.access_token.clone(),
            refresh_token: t.refresh_token.clone(),
            principal: t.principal.clone(),
        }
    }
}

type Waiter = oneshot::Sender<Result<String, ClientError>>;

#[derive(Default)]
struct State {
    credentials: Option<Credentials>,
    /// Bumped whenever credentials are installed or cleared by the caller.
    /// A rotation that started under an older epoch must not store its result.
    epoch: u64,
    in_flight: bool,
    waiters: VecDeque<Waiter>,
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Every waiter gets the leader's outcome. Failures are always terminal.
fn waiter_outcome(outcome: &Result<String, ClientError>) -> Result<String, ClientError> {
    match outcome {
        Ok(grant) => Ok(grant.clone()),
        Err(_) => Err(ClientError::ReauthenticationRequired),
    }
}

/// Clears the in-flight flag and releases waiters, even if the leader's
/// future is dropped mid-rotation.
struct Flight<'a> {
    state: &'a Mutex<State>,
    released: bool,
}

impl Flight<'_> {
    fn release(&mut self, st: &mut State, outcome: &Result<String, ClientError>) {
        st.in_flight = false;
        let waiters = std::mem::take(&mut st.waiters);
        debug!(waiters = waiters.len(), "releasing rotation waiters");
        for tx in waiters {
            // A waiter that gave up has dropped its receiver; nothing to do.
            let _ = tx.send(waiter_outcome(outcome));
        }
        self.released = true;
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        warn!("rotation abandoned; failing queued callers");
        let mut st = lock(self.state);
        self.release(&mut st, &Err(ClientError::ReauthenticationRequired));
    }
}

enum Role {
    Leader { refresh_token: String, epoch: u64 },
    Waiter(oneshot::Receiver<Result<String, ClientError>>),
}

/// Holds one principal's token pair and serializes its rotation.
pub struct RefreshCoordinator {
    refresher: Arc<dyn TokenRefresher>,
    state: Mutex<State>,
}

impl RefreshCoordinator {
    pub fn new(refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            refresher,
            state: Mutex::new(State::default()),
        }
    }

    /// Store a pair obtained from login or registration.
    pub fn install(&self, tokens: &TokenResponse) {
        let mut st = lock(&self.state);
        st.credentials = Some(Credentials::from(tokens));
        st.epoch += 1;
    }

    pub fn access_grant(&self) -> Option<String> {
        lock(&self.state)
            .credentials
            .as_ref()
            .map(|c| c.access_grant.clone())
    }

    pub fn refresh_token(&self) -> Option<String> {
        lock(&self.state)
            .credentials
            .as_ref()
            .map(|c| c.refresh_token.clone())
    }

    /// Principal snapshot from the most recent pair.
    pub fn principal(&self) -> Option<PrincipalView> {
        lock(&self.state)
            .credentials
            .as_ref()
            .map(|c| c.principal.clone())
    }

    pub fn is_rotating(&self) -> bool {
        lock(&self.state).in_flight
    }

    pub fn pending_waiters(&self) -> usize {
        lock(&self.state).waiters.len()
    }

    /// Forget the local pair and revoke its refresh token. A rotation still
    /// in flight will revoke whatever it mints, and every later call needs a
    /// fresh login.
    pub async fn logout(&self) -> Result<(), ClientError> {
        let token = {
            let mut st = lock(&self.state);
            st.epoch += 1;
            st.credentials.take().map(|c| c.refresh_token)
        };
        if let Some(token) = token {
            self.refresher.revoke(&token).await?;
        }
        info!("session ended");
        Ok(())
    }

    /// Recover from a call rejected with `failed_grant`. Returns the grant to
    /// retry with, or [`ClientError::ReauthenticationRequired`].
    pub async fn renew(&self, failed_grant: &str) -> Result<String, ClientError> {
        let role = {
            let mut st = lock(&self.state);
            let Some(creds) = st.credentials.as_ref() else {
                return Err(ClientError::ReauthenticationRequired);
            };
            if creds.access_grant != failed_grant {
                debug!("grant already rotated; reusing current grant");
                return Ok(creds.access_grant.clone());
            }
            let refresh_token = creds.refresh_token.clone();
            if st.in_flight {
                let (tx, rx) = oneshot::channel();
                st.waiters.push_back(tx);
                Role::Waiter(rx)
            } else {
                st.in_flight = true;
                Role::Leader {
                    refresh_token,
                    epoch: st.epoch,
                }
            }
        };

        match role {
            Role::Waiter(rx) => rx
                .await
                .unwrap_or(Err(ClientError::ReauthenticationRequired)),
            Role::Leader {
                refresh_token,
                epoch,
            } => self.lead(&refresh_token, epoch).await,
        }
    }

    async fn lead(&self, refresh_token: &str, epoch: u64) -> Result<String, ClientError> {
        let mut flight = Flight {
            state: &self.state,
            released: false,
        };
        debug!("rotating refresh token");
        let result = self.refresher.refresh(refresh_token).await;

        let (outcome, orphan) = {
            let mut st = lock(&self.state);
            let superseded = st.epoch != epoch;
            let (outcome, orphan) = match result {
                Ok(tokens) if !superseded => {
                    st.credentials = Some(Credentials::from(&tokens));
                    info!("access grant rotated");
                    (Ok(tokens.access_token), None)
                }
                Ok(tokens) => {
                    warn!("session ended during rotation; discarding new pair");
                    (
                        Err(ClientError::ReauthenticationRequired),
                        Some(tokens.refresh_token),
                    )
                }
                Err(err) => {
                    warn!(error = %err, "token rotation failed");
                    if !superseded {
                        st.credentials = None;
                    }
                    (Err(ClientError::ReauthenticationRequired), None)
                }
            };
            flight.release(&mut st, &outcome);
            (outcome, orphan)
        };

        if let Some(token) = orphan
            && let Err(err) = self.refresher.revoke(&token).await
        {
            warn!(error = %err, "failed to revoke refresh token minted after logout");
        }
        outcome
    }
}
