//! PostgreSQL credential store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::AuthError;
use super::store::CredentialStore;
use crate::models::auth::{NewPrincipal, Principal, PrincipalWithSecret};
use crate::uuid::uuidv7;

type PrincipalRow = (Uuid, String, String, bool, bool, Vec<String>, DateTime<Utc>);

const PRINCIPAL_COLUMNS: &str =
    "id, login_key, display_name, is_admin, is_active, permitted_paths, created_at";

fn principal_from_row(row: PrincipalRow) -> Principal {
    let (id, login_key, display_name, is_admin, is_active, permitted_paths, created_at) = row;
    Principal {
        id,
        login_key,
        display_name,
        is_admin,
        is_active,
        permitted_paths,
        created_at,
    }
}

/// Credential store backed by the `principals` and `sessions` tables.
#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_principal_by_login(
        &self,
        login_key: &str,
    ) -> Result<Option<PrincipalWithSecret>, AuthError> {
        let sql = format!(
            "SELECT {PRINCIPAL_COLUMNS}, secret_hash FROM principals WHERE login_key = $1"
        );
        let row = sqlx::query_as::<
            _,
            (Uuid, String, String, bool, bool, Vec<String>, DateTime<Utc>, String),
        >(&sql)
        .bind(login_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(id, login_key, display_name, is_admin, is_active, paths, created_at, hash)| {
            PrincipalWithSecret {
                principal: principal_from_row((
                    id,
                    login_key,
                    display_name,
                    is_admin,
                    is_active,
                    paths,
                    created_at,
                )),
                secret_hash: hash,
            }
        }))
    }

    async fn get_principal(&self, id: Uuid) -> Result<Option<Principal>, AuthError> {
        let sql = format!("SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE id = $1");
        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(principal_from_row))
    }

    async fn create_principal(&self, new: NewPrincipal) -> Result<Principal, AuthError> {
        let sql = format!(
            "INSERT INTO principals (id, login_key, display_name, secret_hash, permitted_paths) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {PRINCIPAL_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(new.id)
            .bind(&new.login_key)
            .bind(&new.display_name)
            .bind(&new.secret_hash)
            .bind(&new.permitted_paths)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                    AuthError::AlreadyExists
                }
                other => AuthError::from(other),
            })?;
        Ok(principal_from_row(row))
    }

    async fn list_principals(&self) -> Result<Vec<Principal>, AuthError> {
        let sql = format!("SELECT {PRINCIPAL_COLUMNS} FROM principals ORDER BY created_at, id");
        let rows = sqlx::query_as::<_, PrincipalRow>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(principal_from_row).collect())
    }

    async fn set_admin(&self, id: Uuid, is_admin: bool) -> Result<Option<Principal>, AuthError> {
        let sql = format!(
            "UPDATE principals SET is_admin = $2 WHERE id = $1 RETURNING {PRINCIPAL_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(id)
            .bind(is_admin)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(principal_from_row))
    }

    async fn set_active(
        &self,
        id: Uuid,
        is_active: bool,
    ) -> Result<Option<Principal>, AuthError> {
        let sql = format!(
            "UPDATE principals SET is_active = $2 WHERE id = $1 RETURNING {PRINCIPAL_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(id)
            .bind(is_active)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(principal_from_row))
    }

    async fn set_permitted_paths(
        &self,
        id: Uuid,
        paths: Vec<String>,
    ) -> Result<Option<Principal>, AuthError> {
        let sql = format!(
            "UPDATE principals SET permitted_paths = $2 WHERE id = $1 RETURNING {PRINCIPAL_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PrincipalRow>(&sql)
            .bind(id)
            .bind(paths)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(principal_from_row))
    }

    async fn insert_session(
        &self,
        token_hash: &str,
        principal_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AuthError> {
        sqlx::query(
            "INSERT INTO sessions (id, token_hash, principal_id, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(uuidv7())
        .bind(token_hash)
        .bind(principal_id)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn rotate_session(
        &self,
        old_hash: &str,
        new_hash: &str,
        new_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, AuthError> {
        let mut tx = self.pool.begin().await?;

        // A concurrent UPDATE on the same row blocks on its lock, then
        // re-checks `revoked_at IS NULL` and matches nothing.
        let principal_id = sqlx::query_scalar::<_, Uuid>(
            "UPDATE sessions SET revoked_at = $2 \
             WHERE token_hash = $1 AND revoked_at IS NULL AND expires_at > $2 \
             RETURNING principal_id",
        )
        .bind(old_hash)
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(principal_id) = principal_id else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            "INSERT INTO sessions (id, token_hash, principal_id, expires_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(uuidv7())
        .bind(new_hash)
        .bind(principal_id)
        .bind(new_expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(principal_id))
    }

    async fn revoke_session(&self, token_hash: &str) -> Result<bool, AuthError> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_at = now() \
             WHERE token_hash = $1 AND revoked_at IS NULL",
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_sessions(&self, principal_id: Uuid) -> Result<u64, AuthError> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_at = now() \
             WHERE principal_id = $1 AND revoked_at IS NULL",
        )
        .bind(principal_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
