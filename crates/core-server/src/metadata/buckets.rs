//! Database operations for buckets and per-table catalog rows.

use chrono::Utc;
use sqlx::PgPool;

use crate::db::{DbError, DbResult};

use super::models::{branch_key, BucketRow, TableRow, MAIN_BRANCH};

pub async fn create_bucket(
    pool: &PgPool,
    project_id: &str,
    branch_id: Option<&str>,
    name: &str,
) -> DbResult<BucketRow> {
    let branch_id = branch_key(branch_id);
    let row = sqlx::query_as::<_, BucketRow>(
        r#"
        INSERT INTO buckets (project_id, branch_id, name, created_at)
        VALUES ($1, $2, $3, $4)
        RETURNING project_id, branch_id, name, created_at
        "#,
    )
    .bind(project_id)
    .bind(branch_id)
    .bind(name)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return DbError::duplicate("bucket", name);
            }
        }
        DbError::from(e)
    })?;
    Ok(row)
}

pub async fn get_bucket(
    pool: &PgPool,
    project_id: &str,
    branch_id: Option<&str>,
    name: &str,
) -> DbResult<BucketRow> {
    let branch_id = branch_key(branch_id);
    sqlx::query_as::<_, BucketRow>(
        "SELECT project_id, branch_id, name, created_at FROM buckets WHERE project_id = $1 AND branch_id = $2 AND name = $3",
    )
    .bind(project_id)
    .bind(branch_id)
    .bind(name)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::not_found("bucket", name))
}

pub async fn list_buckets(
    pool: &PgPool,
    project_id: &str,
    branch_id: Option<&str>,
) -> DbResult<Vec<BucketRow>> {
    let branch_id = branch_key(branch_id);
    let rows = sqlx::query_as::<_, BucketRow>(
        "SELECT project_id, branch_id, name, created_at FROM buckets WHERE project_id = $1 AND branch_id = $2 ORDER BY name",
    )
    .bind(project_id)
    .bind(branch_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn delete_bucket(
    pool: &PgPool,
    project_id: &str,
    branch_id: Option<&str>,
    name: &str,
) -> DbResult<()> {
    let branch_id = branch_key(branch_id);
    let result = sqlx::query("DELETE FROM buckets WHERE project_id = $1 AND branch_id = $2 AND name = $3")
        .bind(project_id)
        .bind(branch_id)
        .bind(name)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::not_found("bucket", name));
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn create_table(
    pool: &PgPool,
    project_id: &str,
    branch_id: Option<&str>,
    bucket_name: &str,
    table_name: &str,
    columns: serde_json::Value,
    primary_key: serde_json::Value,
) -> DbResult<TableRow> {
    let branch_id = branch_key(branch_id);
    let now = Utc::now();
    let row = sqlx::query_as::<_, TableRow>(
        r#"
        INSERT INTO tables (project_id, branch_id, bucket_name, table_name, columns, primary_key, row_count, size_bytes, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, 0, 0, $7, $7)
        RETURNING project_id, branch_id, bucket_name, table_name, columns, primary_key, row_count, size_bytes, created_at, updated_at
        "#,
    )
    .bind(project_id)
    .bind(branch_id)
    .bind(bucket_name)
    .bind(table_name)
    .bind(columns)
    .bind(primary_key)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return DbError::duplicate("table", table_name);
            }
        }
        DbError::from(e)
    })?;
    Ok(row)
}

pub async fn get_table(
    pool: &PgPool,
    project_id: &str,
    branch_id: Option<&str>,
    bucket_name: &str,
    table_name: &str,
) -> DbResult<TableRow> {
    let branch_id = branch_key(branch_id);
    sqlx::query_as::<_, TableRow>(
        r#"
        SELECT project_id, branch_id, bucket_name, table_name, columns, primary_key, row_count, size_bytes, created_at, updated_at
        FROM tables WHERE project_id = $1 AND branch_id = $2 AND bucket_name = $3 AND table_name = $4
        "#,
    )
    .bind(project_id)
    .bind(branch_id)
    .bind(bucket_name)
    .bind(table_name)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::not_found("table", table_name))
}

pub async fn list_tables(
    pool: &PgPool,
    project_id: &str,
    branch_id: Option<&str>,
    bucket_name: &str,
) -> DbResult<Vec<TableRow>> {
    let branch_id = branch_key(branch_id);
    let rows = sqlx::query_as::<_, TableRow>(
        r#"
        SELECT project_id, branch_id, bucket_name, table_name, columns, primary_key, row_count, size_bytes, created_at, updated_at
        FROM tables WHERE project_id = $1 AND branch_id = $2 AND bucket_name = $3 ORDER BY table_name
        "#,
    )
    .bind(project_id)
    .bind(branch_id)
    .bind(bucket_name)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Lists every table that currently exists on `main` for a project — used
/// when resolving branch reads that have not copied a table yet.
pub async fn list_main_tables(pool: &PgPool, project_id: &str, bucket_name: &str) -> DbResult<Vec<TableRow>> {
    list_tables(pool, project_id, Some(MAIN_BRANCH), bucket_name).await
}

pub async fn update_table_schema(
    pool: &PgPool,
    project_id: &str,
    branch_id: Option<&str>,
    bucket_name: &str,
    table_name: &str,
    columns: serde_json::Value,
    primary_key: serde_json::Value,
) -> DbResult<TableRow> {
    let branch_id = branch_key(branch_id);
    let row = sqlx::query_as::<_, TableRow>(
        r#"
        UPDATE tables SET columns = $5, primary_key = $6, updated_at = $7
        WHERE project_id = $1 AND branch_id = $2 AND bucket_name = $3 AND table_name = $4
        RETURNING project_id, branch_id, bucket_name, table_name, columns, primary_key, row_count, size_bytes, created_at, updated_at
        "#,
    )
    .bind(project_id)
    .bind(branch_id)
    .bind(bucket_name)
    .bind(table_name)
    .bind(columns)
    .bind(primary_key)
    .bind(Utc::now())
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::not_found("table", table_name))?;
    Ok(row)
}

pub async fn update_table_stats(
    pool: &PgPool,
    project_id: &str,
    branch_id: Option<&str>,
    bucket_name: &str,
    table_name: &str,
    row_count: i64,
    size_bytes: i64,
) -> DbResult<()> {
    let branch_id = branch_key(branch_id);
    sqlx::query(
        r#"
        UPDATE tables SET row_count = $5, size_bytes = $6, updated_at = $7
        WHERE project_id = $1 AND branch_id = $2 AND bucket_name = $3 AND table_name = $4
        "#,
    )
    .bind(project_id)
    .bind(branch_id)
    .bind(bucket_name)
    .bind(table_name)
    .bind(row_count)
    .bind(size_bytes)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_table(
    pool: &PgPool,
    project_id: &str,
    branch_id: Option<&str>,
    bucket_name: &str,
    table_name: &str,
) -> DbResult<()> {
    let branch_id = branch_key(branch_id);
    let result = sqlx::query(
        "DELETE FROM tables WHERE project_id = $1 AND branch_id = $2 AND bucket_name = $3 AND table_name = $4",
    )
    .bind(project_id)
    .bind(branch_id)
    .bind(bucket_name)
    .bind(table_name)
    .execute(pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::not_found("table", table_name));
    }
    Ok(())
}
