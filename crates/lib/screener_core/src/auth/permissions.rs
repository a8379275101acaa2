//! Path-based permission policy.
//!
//! [`can_access`] is the single authorization rule. The API request guard
//! and the client page guard both call it.

use crate::models::auth::{AccessClaims, Principal};
use crate::models::wire::PrincipalView;

/// Always reachable, even without a principal.
pub const HOME_PATH: &str = "/";

/// User administration. Never reachable by non-admins, whatever their set says.
pub const ADMIN_ONLY_PATH: &str = "/users";

/// Paths granted on registration.
pub const DEFAULT_PERMITTED_PATHS: &[&str] = &["/", "/stocks", "/strategies"];

/// Anything that carries an admin flag and a permitted-paths set.
pub trait PermissionSubject {
    fn is_admin(&self) -> bool;
    fn permitted_paths(&self) -> &[String];
}

impl PermissionSubject for Principal {
    fn is_admin(&self) -> bool {
        self.is_admin
    }

    fn permitted_paths(&self) -> &[String] {
        &self.permitted_paths
    }
}

impl PermissionSubject for PrincipalView {
    fn is_admin(&self) -> bool {
        self.is_admin
    }

    fn permitted_paths(&self) -> &[String] {
        &self.permitted_paths
    }
}

impl PermissionSubject for AccessClaims {
    fn is_admin(&self) -> bool {
        self.admin
    }

    fn permitted_paths(&self) -> &[String] {
        &self.paths
    }
}

/// Whether `subject` (or an anonymous caller when `None`) may reach `path`.
pub fn can_access<S: PermissionSubject + ?Sized>(subject: Option<&S>, path: &str) -> bool {
    let path = normalize_path(path);
    if path == HOME_PATH {
        return true;
    }
    let Some(subject) = subject else {
        return false;
    };
    if subject.is_admin() {
        return true;
    }
    if path == ADMIN_ONLY_PATH {
        return false;
    }
    subject
        .permitted_paths()
        .iter()
        .any(|p| normalize_path(p) == path)
}

/// Trim whitespace and trailing slashes; an empty result is the home path.
pub fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() { HOME_PATH } else { trimmed }
}

/// Normalize a permitted-paths set: drop blanks, keep first occurrence order.
pub fn normalize_path_set<I, S>(paths: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for raw in paths {
        if raw.as_ref().trim().is_empty() {
            continue;
        }
        let path = normalize_path(raw.as_ref());
        if !out.iter().any(|p| p == path) {
            out.push(path.to_string());
        }
    }
    out
}
