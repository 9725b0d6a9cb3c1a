//! Database operations for projects and dev branches.

use chrono::Utc;
use sqlx::PgPool;

use crate::db::{DbError, DbResult};

use super::models::{BranchRow, ProjectRow};

pub async fn create_project(pool: &PgPool, id: &str, display_name: &str) -> DbResult<ProjectRow> {
    if get_project(pool, id).await.is_ok() {
        return Err(DbError::duplicate("project", id));
    }

    let row = sqlx::query_as::<_, ProjectRow>(
        r#"
        INSERT INTO projects (id, display_name, status, created_at)
        VALUES ($1, $2, 'active', $3)
        RETURNING id, display_name, status, created_at, deleted_at
        "#,
    )
    .bind(id)
    .bind(display_name)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return DbError::duplicate("project", id);
            }
        }
        DbError::from(e)
    })?;

    tracing::info!(project_id = %row.id, "created project");
    Ok(row)
}

pub async fn get_project(pool: &PgPool, id: &str) -> DbResult<ProjectRow> {
    sqlx::query_as::<_, ProjectRow>(
        "SELECT id, display_name, status, created_at, deleted_at FROM projects WHERE id = $1 AND status = 'active'",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::not_found("project", id))
}

pub async fn list_projects(pool: &PgPool) -> DbResult<Vec<ProjectRow>> {
    let rows = sqlx::query_as::<_, ProjectRow>(
        "SELECT id, display_name, status, created_at, deleted_at FROM projects WHERE status = 'active' ORDER BY created_at",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Soft-delete: marks the project deleted rather than removing the row,
/// so historical operation-log entries keep a valid foreign key target.
pub async fn soft_delete_project(pool: &PgPool, id: &str) -> DbResult<()> {
    let result = sqlx::query(
        "UPDATE projects SET status = 'deleted', deleted_at = $2 WHERE id = $1 AND status = 'active'",
    )
    .bind(id)
    .bind(Utc::now())
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::not_found("project", id));
    }
    tracing::info!(project_id = %id, "soft-deleted project");
    Ok(())
}

pub async fn create_branch(
    pool: &PgPool,
    id: &str,
    project_id: &str,
    name: &str,
    description: Option<&str>,
) -> DbResult<BranchRow> {
    let row = sqlx::query_as::<_, BranchRow>(
        r#"
        INSERT INTO branches (id, project_id, name, description, created_at)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, project_id, name, description, created_at
        "#,
    )
    .bind(id)
    .bind(project_id)
    .bind(name)
    .bind(description)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(ref db_err) = e {
            if db_err.is_unique_violation() {
                return DbError::duplicate("branch", name);
            }
        }
        DbError::from(e)
    })?;

    tracing::info!(branch_id = %row.id, project_id = %project_id, "created branch");
    Ok(row)
}

pub async fn get_branch(pool: &PgPool, branch_id: &str) -> DbResult<BranchRow> {
    sqlx::query_as::<_, BranchRow>(
        "SELECT id, project_id, name, description, created_at FROM branches WHERE id = $1",
    )
    .bind(branch_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::not_found("branch", branch_id))
}

pub async fn list_branches(pool: &PgPool, project_id: &str) -> DbResult<Vec<BranchRow>> {
    let rows = sqlx::query_as::<_, BranchRow>(
        "SELECT id, project_id, name, description, created_at FROM branches WHERE project_id = $1 ORDER BY created_at",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn delete_branch(pool: &PgPool, branch_id: &str) -> DbResult<()> {
    let result = sqlx::query("DELETE FROM branches WHERE id = $1")
        .bind(branch_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::not_found("branch", branch_id));
    }
    Ok(())
}

/// Records that `bucket_name/table_name` has been copied-on-write into
/// `branch_id`. Idempotent: re-marking an already-copied table is a no-op.
pub async fn mark_table_copied_to_branch(
    pool: &PgPool,
    branch_id: &str,
    bucket_name: &str,
    table_name: &str,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO branch_copied_tables (branch_id, bucket_name, table_name, copied_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (branch_id, bucket_name, table_name) DO NOTHING
        "#,
    )
    .bind(branch_id)
    .bind(bucket_name)
    .bind(table_name)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn is_table_in_branch(
    pool: &PgPool,
    branch_id: &str,
    bucket_name: &str,
    table_name: &str,
) -> DbResult<bool> {
    let row: Option<(i32,)> = sqlx::query_as(
        "SELECT 1 FROM branch_copied_tables WHERE branch_id = $1 AND bucket_name = $2 AND table_name = $3",
    )
    .bind(branch_id)
    .bind(bucket_name)
    .bind(table_name)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

pub async fn get_branch_copied_tables(
    pool: &PgPool,
    branch_id: &str,
) -> DbResult<Vec<(String, String)>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT bucket_name, table_name FROM branch_copied_tables WHERE branch_id = $1 ORDER BY copied_at",
    )
    .bind(branch_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
