//! Workspace engine (component I): ephemeral per-session sandboxes used
//! by the PG-wire surface. Workspace credentials hash with SHA-256, not
//! the argon2 scheme `auth::hash_key` uses for API keys — PG-wire's
//! cleartext-password flow needs a fast, single-pass comparison, and the
//! password itself is random and single-use rather than user-chosen.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use duckdb::{params, Connection};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use uuid::Uuid;

use crate::engine::{self, sql};
use crate::error::AppError;
use crate::metadata::buckets as bucket_db;
use crate::metadata::models::WorkspaceRow;
use crate::metadata::workspaces as workspace_db;
use crate::paths::PathResolver;

const PASSWORD_LEN: usize = 32;

pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LEN)
        .map(char::from)
        .collect()
}

pub struct NewWorkspace {
    pub workspace: WorkspaceRow,
    /// Plaintext password — returned only at creation/reset time.
    pub password: String,
}

pub async fn create(
    pool: &PgPool,
    paths: &PathResolver,
    project_id: &str,
    branch_id: Option<&str>,
    name: &str,
    ttl_hours: Option<i64>,
    size_limit_bytes: i64,
) -> Result<NewWorkspace, AppError> {
    let workspace_id = Uuid::new_v4().to_string();
    let username = format!("ws_{workspace_id}_{}", &Uuid::new_v4().to_string()[..8]);
    let password = generate_password();
    let password_hash = hash_password(&password);

    let db_path = paths.workspace_file(project_id, branch_id, &workspace_id)?;
    crate::paths::ensure_parent_dir(&db_path)?;
    Connection::open(&db_path)?;

    let expires_at = ttl_hours.map(|hours| Utc::now() + ChronoDuration::hours(hours));

    let workspace = workspace_db::create_workspace(
        pool,
        &workspace_id,
        project_id,
        branch_id,
        name,
        &db_path.to_string_lossy(),
        size_limit_bytes,
        expires_at,
    )
    .await;

    let workspace = match workspace {
        Ok(w) => w,
        Err(e) => {
            let _ = std::fs::remove_file(&db_path);
            return Err(AppError::from(e));
        },
    };

    workspace_db::upsert_workspace_credentials(pool, &workspace_id, &username, &password_hash).await?;

    Ok(NewWorkspace { workspace, password })
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct WorkspaceStatus {
    pub workspace: WorkspaceRow,
    pub effective_status: String,
}

fn is_expired(workspace: &WorkspaceRow, now: DateTime<Utc>) -> bool {
    workspace.expires_at.is_some_and(|exp| exp < now)
}

pub async fn get(pool: &PgPool, id: &str) -> Result<WorkspaceStatus, AppError> {
    let workspace = workspace_db::get_workspace(pool, id).await?;
    let effective_status = if is_expired(&workspace, Utc::now()) {
        "expired".to_string()
    } else {
        workspace.status.clone()
    };
    Ok(WorkspaceStatus { workspace, effective_status })
}

pub async fn delete(pool: &PgPool, id: &str) -> Result<(), AppError> {
    let workspace = workspace_db::get_workspace(pool, id).await?;
    if std::path::Path::new(&workspace.db_path).exists() {
        std::fs::remove_file(&workspace.db_path)?;
    }
    workspace_db::set_workspace_status(pool, id, "deleted").await?;
    Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct ClearOptions {
    pub ignore_errors: bool,
}

/// Drops every user-created table and view in the workspace file.
pub async fn clear(pool: &PgPool, id: &str, options: &ClearOptions) -> Result<Vec<String>, AppError> {
    let workspace = workspace_db::get_workspace(pool, id).await?;
    let conn = Connection::open(&workspace.db_path)?;
    let mut stmt = conn.prepare(
        "SELECT table_name, table_type FROM information_schema.tables WHERE table_schema = 'main'",
    )?;
    let objects: Vec<(String, String)> = stmt
        .query_map(params![], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
        .collect::<Result<_, _>>()?;
    drop(stmt);

    let mut dropped = Vec::new();
    for (name, table_type) in objects {
        let kind = if table_type == "VIEW" { "VIEW" } else { "TABLE" };
        let result = conn.execute_batch(&format!("DROP {kind} IF EXISTS {}", sql::quote_ident(&name)));
        match result {
            Ok(_) => dropped.push(name),
            Err(e) if options.ignore_errors => {
                tracing::warn!(error = %e, object = %name, "failed to drop workspace object, ignoring");
            },
            Err(e) => return Err(AppError::from(e)),
        }
    }
    Ok(dropped)
}

pub async fn drop_object(pool: &PgPool, id: &str, object_name: &str, ignore_if_not_exists: bool) -> Result<(), AppError> {
    let workspace = workspace_db::get_workspace(pool, id).await?;
    let conn = Connection::open(&workspace.db_path)?;
    let quoted = sql::quote_ident(object_name);
    let result = conn
        .execute_batch(&format!("DROP TABLE {quoted}"))
        .or_else(|_| conn.execute_batch(&format!("DROP VIEW {quoted}")));
    match result {
        Ok(_) => Ok(()),
        Err(e) if ignore_if_not_exists => {
            tracing::warn!(error = %e, object = %object_name, "drop_object: object missing, ignored");
            Ok(())
        },
        Err(e) => Err(AppError::from(e)),
    }
}

pub struct ResetCredentials {
    pub password: String,
}

pub async fn reset_credentials(pool: &PgPool, id: &str) -> Result<ResetCredentials, AppError> {
    let creds = sqlx::query_as::<_, crate::metadata::models::WorkspaceCredentialsRow>(
        "SELECT workspace_id, username, password_hash, rotated_at FROM workspace_credentials WHERE workspace_id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(crate::db::DbError::from)?
    .ok_or_else(|| AppError::NotFound(format!("workspace '{id}' has no credentials")))?;

    let password = generate_password();
    let password_hash = hash_password(&password);
    workspace_db::upsert_workspace_credentials(pool, id, &creds.username, &password_hash).await?;
    Ok(ResetCredentials { password })
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct LoadTableSpec {
    pub source: String,
    pub destination: Option<String>,
    pub columns: Option<Vec<String>>,
    pub r#where: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LoadTableResult {
    pub source: String,
    pub destination: String,
    pub rows_loaded: u64,
}

/// Copies rows from project tables into workspace tables. A source that
/// does not parse as `bucket.table` or does not resolve yields zero rows
/// for that entry rather than failing the whole batch.
pub async fn load_tables(
    pool: &PgPool,
    paths: &PathResolver,
    project_id: &str,
    branch_id: Option<&str>,
    workspace_id: &str,
    specs: &[LoadTableSpec],
) -> Result<Vec<LoadTableResult>, AppError> {
    let workspace = workspace_db::get_workspace(pool, workspace_id).await?;
    let conn = Connection::open(&workspace.db_path)?;

    let mut results = Vec::with_capacity(specs.len());
    for spec in specs {
        let destination = spec.destination.clone().unwrap_or_else(|| spec.source.replace('.', "_"));
        let Some((bucket, table)) = spec.source.split_once('.') else {
            results.push(LoadTableResult { source: spec.source.clone(), destination, rows_loaded: 0 });
            continue;
        };

        if bucket_db::get_table(pool, project_id, branch_id, bucket, table).await.is_err() {
            results.push(LoadTableResult { source: spec.source.clone(), destination, rows_loaded: 0 });
            continue;
        }

        let source_path = match paths.table_file(project_id, branch_id, bucket, table) {
            Ok(p) if p.exists() => p,
            _ => {
                results.push(LoadTableResult { source: spec.source.clone(), destination, rows_loaded: 0 });
                continue;
            },
        };

        let alias = format!("load_src_{}_{}", bucket, table);
        let projection = spec
            .columns
            .as_ref()
            .map(|cols| cols.iter().map(|c| sql::quote_ident(c)).collect::<Vec<_>>().join(", "))
            .unwrap_or_else(|| "*".to_string());
        let where_sql = spec.r#where.as_ref().map(|w| format!(" WHERE {w}")).unwrap_or_default();

        conn.execute_batch(&format!(
            "ATTACH '{}' AS {} (READ_ONLY)",
            sql::escape_sql_literal(&source_path.to_string_lossy()),
            sql::quote_ident(&alias),
        ))?;

        let select = format!("SELECT {projection} FROM {}.{}{where_sql}", sql::quote_ident(&alias), sql::quote_ident(engine::DATA_TABLE));
        conn.execute_batch(&format!(
            "CREATE OR REPLACE TABLE {} AS {select}",
            sql::quote_ident(&destination)
        ))?;
        let rows_loaded: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", sql::quote_ident(&destination)), params![], |r| r.get(0))?;
        conn.execute_batch(&format!("DETACH {}", sql::quote_ident(&alias)))?;

        results.push(LoadTableResult { source: spec.source.clone(), destination, rows_loaded: rows_loaded as u64 });
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_password_is_deterministic_sha256() {
        let h1 = hash_password("correct-horse-battery-staple");
        let h2 = hash_password("correct-horse-battery-staple");
        assert_eq!(h1, h2);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn generated_password_is_requested_length() {
        assert_eq!(generate_password().len(), PASSWORD_LEN);
    }

    #[test]
    fn expired_workspace_reports_expired_status() {
        let workspace = WorkspaceRow {
            id: "w1".into(),
            project_id: "p1".into(),
            branch_id: None,
            name: "n".into(),
            db_path: "/tmp/x.duckdb".into(),
            size_limit_bytes: 1,
            status: "active".into(),
            expires_at: Some(Utc::now() - ChronoDuration::hours(1)),
            created_at: Utc::now(),
        };
        assert!(is_expired(&workspace, Utc::now()));
    }
}
