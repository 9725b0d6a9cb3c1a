//! Database operations for workspaces, workspace credentials, and PG-wire sessions.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{DbError, DbResult};

use super::models::{PgWireSessionRow, WorkspaceCredentialsRow, WorkspaceRow};

#[allow(clippy::too_many_arguments)]
pub async fn create_workspace(
    pool: &PgPool,
    id: &str,
    project_id: &str,
    branch_id: Option<&str>,
    name: &str,
    db_path: &str,
    size_limit_bytes: i64,
    expires_at: Option<DateTime<Utc>>,
) -> DbResult<WorkspaceRow> {
    let row = sqlx::query_as::<_, WorkspaceRow>(
        r#"
        INSERT INTO workspaces (id, project_id, branch_id, name, db_path, size_limit_bytes, status, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, 'active', $7, $8)
        RETURNING id, project_id, branch_id, name, db_path, size_limit_bytes, status, expires_at, created_at
        "#,
    )
    .bind(id)
    .bind(project_id)
    .bind(branch_id)
    .bind(name)
    .bind(db_path)
    .bind(size_limit_bytes)
    .bind(expires_at)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_workspace(pool: &PgPool, id: &str) -> DbResult<WorkspaceRow> {
    sqlx::query_as::<_, WorkspaceRow>(
        "SELECT id, project_id, branch_id, name, db_path, size_limit_bytes, status, expires_at, created_at FROM workspaces WHERE id = $1 AND status != 'deleted'",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::not_found("workspace", id))
}

pub async fn list_workspaces(pool: &PgPool, project_id: &str) -> DbResult<Vec<WorkspaceRow>> {
    let rows = sqlx::query_as::<_, WorkspaceRow>(
        "SELECT id, project_id, branch_id, name, db_path, size_limit_bytes, status, expires_at, created_at FROM workspaces WHERE project_id = $1 AND status != 'deleted' ORDER BY created_at DESC",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn set_workspace_status(pool: &PgPool, id: &str, status: &str) -> DbResult<()> {
    let result = sqlx::query("UPDATE workspaces SET status = $2 WHERE id = $1")
        .bind(id)
        .bind(status)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(DbError::not_found("workspace", id));
    }
    Ok(())
}

pub async fn upsert_workspace_credentials(
    pool: &PgPool,
    workspace_id: &str,
    username: &str,
    password_hash: &str,
) -> DbResult<WorkspaceCredentialsRow> {
    let row = sqlx::query_as::<_, WorkspaceCredentialsRow>(
        r#"
        INSERT INTO workspace_credentials (workspace_id, username, password_hash, rotated_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (workspace_id) DO UPDATE SET username = $2, password_hash = $3, rotated_at = $4
        RETURNING workspace_id, username, password_hash, rotated_at
        "#,
    )
    .bind(workspace_id)
    .bind(username)
    .bind(password_hash)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_workspace_credentials_by_username(
    pool: &PgPool,
    username: &str,
) -> DbResult<WorkspaceCredentialsRow> {
    sqlx::query_as::<_, WorkspaceCredentialsRow>(
        "SELECT workspace_id, username, password_hash, rotated_at FROM workspace_credentials WHERE username = $1",
    )
    .bind(username)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::not_found("workspace credentials", username))
}

pub async fn create_pgwire_session(pool: &PgPool, workspace_id: &str, client_ip: &str) -> DbResult<PgWireSessionRow> {
    let row = sqlx::query_as::<_, PgWireSessionRow>(
        r#"
        INSERT INTO pgwire_sessions (session_id, workspace_id, client_ip, connected_at, last_activity_at, query_count, status)
        VALUES ($1, $2, $3, $4, $4, 0, 'active')
        RETURNING session_id, workspace_id, client_ip, connected_at, last_activity_at, query_count, status
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(workspace_id)
    .bind(client_ip)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn touch_pgwire_session(pool: &PgPool, session_id: Uuid) -> DbResult<()> {
    sqlx::query(
        "UPDATE pgwire_sessions SET last_activity_at = $2, query_count = query_count + 1 WHERE session_id = $1",
    )
    .bind(session_id)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn close_pgwire_session(pool: &PgPool, session_id: Uuid, status: &str) -> DbResult<()> {
    sqlx::query("UPDATE pgwire_sessions SET status = $2 WHERE session_id = $1 AND status = 'active'")
        .bind(session_id)
        .bind(status)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_pgwire_session(pool: &PgPool, session_id: Uuid) -> DbResult<PgWireSessionRow> {
    sqlx::query_as::<_, PgWireSessionRow>(
        "SELECT session_id, workspace_id, client_ip, connected_at, last_activity_at, query_count, status FROM pgwire_sessions WHERE session_id = $1",
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::not_found("pgwire session", &session_id.to_string()))
}

pub async fn list_pgwire_sessions(pool: &PgPool, workspace_id: &str) -> DbResult<Vec<PgWireSessionRow>> {
    let rows = sqlx::query_as::<_, PgWireSessionRow>(
        "SELECT session_id, workspace_id, client_ip, connected_at, last_activity_at, query_count, status FROM pgwire_sessions WHERE workspace_id = $1 ORDER BY connected_at DESC",
    )
    .bind(workspace_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn count_active_pgwire_sessions(pool: &PgPool, workspace_id: &str) -> DbResult<i64> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM pgwire_sessions WHERE workspace_id = $1 AND status = 'active'",
    )
    .bind(workspace_id)
    .fetch_one(pool)
    .await?;
    Ok(row.0)
}

/// Marks sessions idle longer than `idle_seconds` as timed out, returning
/// the session ids so the caller can also close the live connection.
pub async fn cleanup_idle_sessions(pool: &PgPool, idle_seconds: i64) -> DbResult<Vec<Uuid>> {
    let cutoff = Utc::now() - chrono::Duration::seconds(idle_seconds);
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        r#"
        UPDATE pgwire_sessions SET status = 'timeout'
        WHERE status = 'active' AND last_activity_at < $1
        RETURNING session_id
        "#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Marks every active session as drained, used during graceful shutdown.
pub async fn drain_all_sessions(pool: &PgPool) -> DbResult<Vec<Uuid>> {
    let rows: Vec<(Uuid,)> = sqlx::query_as(
        "UPDATE pgwire_sessions SET status = 'server_drain' WHERE status = 'active' RETURNING session_id",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}
