//! Database operations for cross-project bucket sharing and links.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{DbError, DbResult};

use super::models::{BucketLinkRow, BucketShareRow};

pub async fn create_share(
    pool: &PgPool,
    source_project_id: &str,
    source_bucket: &str,
    target_project_id: &str,
) -> DbResult<BucketShareRow> {
    let row = sqlx::query_as::<_, BucketShareRow>(
        r#"
        INSERT INTO bucket_shares (id, source_project_id, source_bucket, target_project_id, share_type, created_at)
        VALUES ($1, $2, $3, $4, 'standard', $5)
        RETURNING id, source_project_id, source_bucket, target_project_id, share_type, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(source_project_id)
    .bind(source_bucket)
    .bind(target_project_id)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return DbError::duplicate("bucket share", source_bucket);
            }
        }
        DbError::from(e)
    })?;
    Ok(row)
}

pub async fn get_share(
    pool: &PgPool,
    source_project_id: &str,
    source_bucket: &str,
    target_project_id: &str,
) -> DbResult<BucketShareRow> {
    sqlx::query_as::<_, BucketShareRow>(
        r#"
        SELECT id, source_project_id, source_bucket, target_project_id, share_type, created_at
        FROM bucket_shares WHERE source_project_id = $1 AND source_bucket = $2 AND target_project_id = $3
        "#,
    )
    .bind(source_project_id)
    .bind(source_bucket)
    .bind(target_project_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::not_found("bucket share", source_bucket))
}

pub async fn list_shares_for_bucket(
    pool: &PgPool,
    source_project_id: &str,
    source_bucket: &str,
) -> DbResult<Vec<BucketShareRow>> {
    let rows = sqlx::query_as::<_, BucketShareRow>(
        r#"
        SELECT id, source_project_id, source_bucket, target_project_id, share_type, created_at
        FROM bucket_shares WHERE source_project_id = $1 AND source_bucket = $2 ORDER BY created_at
        "#,
    )
    .bind(source_project_id)
    .bind(source_bucket)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn revoke_share(
    pool: &PgPool,
    source_project_id: &str,
    source_bucket: &str,
    target_project_id: &str,
) -> DbResult<()> {
    let result = sqlx::query(
        "DELETE FROM bucket_shares WHERE source_project_id = $1 AND source_bucket = $2 AND target_project_id = $3",
    )
    .bind(source_project_id)
    .bind(source_bucket)
    .bind(target_project_id)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::not_found("bucket share", source_bucket));
    }
    Ok(())
}

pub async fn create_bucket_link(
    pool: &PgPool,
    target_project_id: &str,
    target_bucket: &str,
    source_project_id: &str,
    source_bucket: &str,
    attached_db_alias: &str,
) -> DbResult<BucketLinkRow> {
    let row = sqlx::query_as::<_, BucketLinkRow>(
        r#"
        INSERT INTO bucket_links (target_project_id, target_bucket, source_project_id, source_bucket, attached_db_alias, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING target_project_id, target_bucket, source_project_id, source_bucket, attached_db_alias, created_at
        "#,
    )
    .bind(target_project_id)
    .bind(target_bucket)
    .bind(source_project_id)
    .bind(source_bucket)
    .bind(attached_db_alias)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return DbError::duplicate("bucket link", target_bucket);
            }
        }
        DbError::from(e)
    })?;
    Ok(row)
}

pub async fn get_bucket_link(
    pool: &PgPool,
    target_project_id: &str,
    target_bucket: &str,
) -> DbResult<BucketLinkRow> {
    sqlx::query_as::<_, BucketLinkRow>(
        r#"
        SELECT target_project_id, target_bucket, source_project_id, source_bucket, attached_db_alias, created_at
        FROM bucket_links WHERE target_project_id = $1 AND target_bucket = $2
        "#,
    )
    .bind(target_project_id)
    .bind(target_bucket)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::not_found("bucket link", target_bucket))
}

pub async fn delete_bucket_link(pool: &PgPool, target_project_id: &str, target_bucket: &str) -> DbResult<()> {
    let result = sqlx::query("DELETE FROM bucket_links WHERE target_project_id = $1 AND target_bucket = $2")
        .bind(target_project_id)
        .bind(target_bucket)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::not_found("bucket link", target_bucket));
    }
    Ok(())
}
