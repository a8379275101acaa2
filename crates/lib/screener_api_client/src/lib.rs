//! # screener_api_client
//!
//! HTTP client for the Screener auth API, with single-flight token rotation
//! and the navigation-side permission guard.

pub mod client;
pub mod coordinator;
pub mod error;
pub mod guard;
pub mod session;

pub use client::ApiClient;
pub use coordinator::{RefreshCoordinator, TokenRefresher};
pub use error::ClientError;
pub use guard::{NavigationDecision, check_navigation};
pub use session::AuthSession;
