//! Administrator actions on principals.
//!
//! Callers are expected to have passed the admin-only permission check
//! already; these functions only guard against an admin locking themselves
//! out.

use tracing::info;
use uuid::Uuid;

use super::AuthError;
use super::permissions::normalize_path_set;
use super::store::CredentialStore;
use crate::models::auth::Principal;

/// All principals, oldest first.
pub async fn list_principals(store: &dyn CredentialStore) -> Result<Vec<Principal>, AuthError> {
    store.list_principals().await
}

/// Grant or clear the admin flag. An admin cannot clear their own flag.
pub async fn set_admin(
    store: &dyn CredentialStore,
    actor_id: Option<Uuid>,
    target: Uuid,
    is_admin: bool,
) -> Result<Principal, AuthError> {
    if actor_id == Some(target) && !is_admin {
        return Err(AuthError::ValidationError(
            "Administrators cannot remove their own admin flag".into(),
        ));
    }
    let principal = store
        .set_admin(target, is_admin)
        .await?
        .ok_or_else(|| AuthError::NotFound(format!("principal {target}")))?;
    info!(actor = ?actor_id, %target, is_admin, "admin flag changed");
    Ok(principal)
}

/// Activate or deactivate a principal. Deactivation revokes every session.
/// An admin cannot deactivate themselves.
pub async fn set_active(
    store: &dyn CredentialStore,
    actor_id: Option<Uuid>,
    target: Uuid,
    is_active: bool,
) -> Result<Principal, AuthError> {
    if actor_id == Some(target) && !is_active {
        return Err(AuthError::ValidationError(
            "Administrators cannot deactivate themselves".into(),
        ));
    }
    let principal = store
        .set_active(target, is_active)
        .await?
        .ok_or_else(|| AuthError::NotFound(format!("principal {target}")))?;
    let revoked = if is_active {
        0
    } else {
        store.revoke_all_sessions(target).await?
    };
    info!(actor = ?actor_id, %target, is_active, revoked, "active flag changed");
    Ok(principal)
}

/// Replace the permitted-paths set. Paths are normalized and deduplicated,
/// keeping first-occurrence order.
pub async fn set_permitted_paths(
    store: &dyn CredentialStore,
    actor_id: Option<Uuid>,
    target: Uuid,
    paths: &[String],
) -> Result<Principal, AuthError> {
    let paths = normalize_path_set(paths);
    let principal = store
        .set_permitted_paths(target, paths)
        .await?
        .ok_or_else(|| AuthError::NotFound(format!("principal {target}")))?;
    info!(
        actor = ?actor_id,
        %target,
        paths = ?principal.permitted_paths,
        "permitted paths replaced"
    );
    Ok(principal)
}

/// Revoke every session of a principal (sign out all devices).
pub async fn revoke_sessions(
    store: &dyn CredentialStore,
    actor_id: Option<Uuid>,
    target: Uuid,
) -> Result<u64, AuthError> {
    if store.get_principal(target).await?.is_none() {
        return Err(AuthError::NotFound(format!("principal {target}")));
    }
    let revoked = store.revoke_all_sessions(target).await?;
    info!(actor = ?actor_id, %target, revoked, "sessions revoked");
    Ok(revoked)
}

/// Promote a principal by login key (operator bootstrap).
pub async fn grant_admin_by_login(
    store: &dyn CredentialStore,
    login_key: &str,
) -> Result<Principal, AuthError> {
    let record = store
        .find_principal_by_login(login_key.trim())
        .await?
        .ok_or_else(|| AuthError::NotFound(format!("login key {login_key}")))?;
    set_admin(store, None, record.principal.id, true).await
}
