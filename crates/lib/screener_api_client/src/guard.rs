//! Page guard: the navigation-side enforcement point of the access policy.

use screener_core::auth::permissions::can_access;
use screener_core::models::wire::PrincipalView;

/// What the client should do with a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationDecision {
    Allow,
    /// Nobody is logged in and the page is not public.
    RedirectToLogin,
    /// Logged in, but the principal may not open the page.
    Forbidden,
}

/// Decide a navigation to `path` with the same rule set the server applies
/// to requests.
pub fn check_navigation(principal: Option<&PrincipalView>, path: &str) -> NavigationDecision {
    if can_access(principal, path) {
        NavigationDecision::Allow
    } else if principal.is_none() {
        NavigationDecision::RedirectToLogin
    } else {
        NavigationDecision::Forbidden
    }
}
