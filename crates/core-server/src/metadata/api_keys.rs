//! Database operations for API keys and S3 access keys.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{DbError, DbResult};

use super::models::ApiKeyRow;

#[allow(clippy::too_many_arguments)]
pub async fn create_api_key(
    pool: &PgPool,
    project_id: Option<&str>,
    branch_id: Option<&str>,
    scope: &str,
    key_hash: &str,
    key_prefix: &str,
    description: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
) -> DbResult<ApiKeyRow> {
    let row = sqlx::query_as::<_, ApiKeyRow>(
        r#"
        INSERT INTO api_keys (id, project_id, branch_id, scope, key_hash, key_prefix, description, revoked, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, false, $8, $9)
        RETURNING id, project_id, branch_id, scope, key_hash, key_prefix, description, revoked, expires_at, last_used_at, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(project_id)
    .bind(branch_id)
    .bind(scope)
    .bind(key_hash)
    .bind(key_prefix)
    .bind(description)
    .bind(expires_at)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Looks up by the key's short, non-secret prefix. Never matches revoked
/// keys; expiry is checked separately by the caller so an expired key can
/// still be reported with a precise `Gone` distinction from `NotFound`.
pub async fn get_api_key_by_prefix(pool: &PgPool, key_prefix: &str) -> DbResult<ApiKeyRow> {
    sqlx::query_as::<_, ApiKeyRow>(
        r#"
        SELECT id, project_id, branch_id, scope, key_hash, key_prefix, description, revoked, expires_at, last_used_at, created_at
        FROM api_keys WHERE key_prefix = $1 AND NOT revoked
        "#,
    )
    .bind(key_prefix)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::not_found("api key", key_prefix))
}

pub async fn update_api_key_last_used(pool: &PgPool, id: Uuid) -> DbResult<()> {
    sqlx::query("UPDATE api_keys SET last_used_at = $2 WHERE id = $1")
        .bind(id)
        .bind(Utc::now())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn revoke_api_key(pool: &PgPool, id: Uuid) -> DbResult<()> {
    let result = sqlx::query("UPDATE api_keys SET revoked = true WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::not_found("api key", &id.to_string()));
    }
    Ok(())
}

pub async fn list_api_keys(pool: &PgPool, project_id: &str) -> DbResult<Vec<ApiKeyRow>> {
    let rows = sqlx::query_as::<_, ApiKeyRow>(
        r#"
        SELECT id, project_id, branch_id, scope, key_hash, key_prefix, description, revoked, expires_at, last_used_at, created_at
        FROM api_keys WHERE project_id = $1 AND NOT revoked ORDER BY created_at DESC
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn create_s3_access_key(
    pool: &PgPool,
    access_key_id: &str,
    secret_access_key: &str,
    api_key_id: Option<Uuid>,
    is_admin: bool,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO s3_access_keys (access_key_id, secret_access_key, api_key_id, is_admin, created_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(access_key_id)
    .bind(secret_access_key)
    .bind(api_key_id)
    .bind(is_admin)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Returns `(secret_access_key, api_key_id, is_admin)` for SigV4 verification.
pub async fn get_s3_secret(pool: &PgPool, access_key_id: &str) -> DbResult<(String, Option<Uuid>, bool)> {
    let row: Option<(String, Option<Uuid>, bool)> = sqlx::query_as(
        "SELECT secret_access_key, api_key_id, is_admin FROM s3_access_keys WHERE access_key_id = $1",
    )
    .bind(access_key_id)
    .fetch_optional(pool)
    .await?;
    row.ok_or_else(|| DbError::not_found("s3 access key", access_key_id))
}
