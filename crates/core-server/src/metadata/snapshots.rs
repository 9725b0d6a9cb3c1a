//! Database operations for snapshots and hierarchical snapshot configuration.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::{DbError, DbResult};

use super::models::{SnapshotConfigRow, SnapshotRow};

#[allow(clippy::too_many_arguments)]
pub async fn create_snapshot(
    pool: &PgPool,
    project_id: &str,
    branch_id: Option<&str>,
    bucket_name: &str,
    table_name: &str,
    snapshot_type: &str,
    description: Option<&str>,
    row_count_at_capture: i64,
    file_path: &str,
    retention_days: i64,
) -> DbResult<SnapshotRow> {
    let now = Utc::now();
    let row = sqlx::query_as::<_, SnapshotRow>(
        r#"
        INSERT INTO snapshots (id, project_id, branch_id, bucket_name, table_name, snapshot_type, description, row_count_at_capture, file_path, created_at, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING id, project_id, branch_id, bucket_name, table_name, snapshot_type, description, row_count_at_capture, file_path, created_at, expires_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(project_id)
    .bind(branch_id)
    .bind(bucket_name)
    .bind(table_name)
    .bind(snapshot_type)
    .bind(description)
    .bind(row_count_at_capture)
    .bind(file_path)
    .bind(now)
    .bind(now + chrono::Duration::days(retention_days))
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_snapshot(pool: &PgPool, id: Uuid) -> DbResult<SnapshotRow> {
    sqlx::query_as::<_, SnapshotRow>(
        r#"
        SELECT id, project_id, branch_id, bucket_name, table_name, snapshot_type, description, row_count_at_capture, file_path, created_at, expires_at
        FROM snapshots WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| DbError::not_found("snapshot", &id.to_string()))
}

pub async fn list_snapshots(
    pool: &PgPool,
    project_id: &str,
    branch_id: Option<&str>,
    bucket_name: &str,
    table_name: &str,
) -> DbResult<Vec<SnapshotRow>> {
    let rows = sqlx::query_as::<_, SnapshotRow>(
        r#"
        SELECT id, project_id, branch_id, bucket_name, table_name, snapshot_type, description, row_count_at_capture, file_path, created_at, expires_at
        FROM snapshots
        WHERE project_id = $1 AND branch_id IS NOT DISTINCT FROM $2 AND bucket_name = $3 AND table_name = $4
        ORDER BY created_at DESC
        "#,
    )
    .bind(project_id)
    .bind(branch_id)
    .bind(bucket_name)
    .bind(table_name)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn delete_snapshot(pool: &PgPool, id: Uuid) -> DbResult<SnapshotRow> {
    let row = get_snapshot(pool, id).await?;
    sqlx::query("DELETE FROM snapshots WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(row)
}

/// Deletes every snapshot whose `expires_at` has passed, returning the
/// deleted rows so the caller can remove the backing `.duckdb` files.
pub async fn cleanup_expired_snapshots(pool: &PgPool) -> DbResult<Vec<SnapshotRow>> {
    let rows = sqlx::query_as::<_, SnapshotRow>(
        r#"
        DELETE FROM snapshots WHERE expires_at < $1
        RETURNING id, project_id, branch_id, bucket_name, table_name, snapshot_type, description, row_count_at_capture, file_path, created_at, expires_at
        "#,
    )
    .bind(Utc::now())
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Resolved snapshot policy after folding system -> project -> bucket -> table scopes.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct EffectiveSnapshotConfig {
    pub enabled: bool,
    pub retention_manual_days: i32,
    pub retention_auto_days: i32,
    pub trigger_drop_table: bool,
    pub trigger_drop_column: bool,
    pub trigger_truncate_table: bool,
    pub trigger_delete_all_rows: bool,
}

/// `EffectiveSnapshotConfig` plus, for each field, which scope last set
/// it (`"system"`, `"project"`, `"bucket"`, or `"table"`). Lets a
/// settings GET explain why a value is what it is.
#[derive(Debug, Clone)]
pub struct ResolvedSnapshotConfig {
    pub effective: EffectiveSnapshotConfig,
    pub inheritance: SnapshotConfigInheritance,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SnapshotConfigInheritance {
    pub enabled: String,
    pub retention_manual_days: String,
    pub retention_auto_days: String,
    pub trigger_drop_table: String,
    pub trigger_drop_column: String,
    pub trigger_truncate_table: String,
    pub trigger_delete_all_rows: String,
}

/// One field's fold across scopes: start from `default`, and for every
/// scope (in narrowing-then-widening-overwrite order, i.e. system first)
/// that has `Some`, take that value and remember its scope name.
fn fold_field<T: Copy>(default: T, rows: &[(&str, &Option<SnapshotConfigRow>)], pick: impl Fn(&SnapshotConfigRow) -> Option<T>) -> (T, String) {
    let mut value = default;
    let mut origin = "system".to_string();
    for (scope, row) in rows {
        if let Some(row) = row {
            if let Some(v) = pick(row) {
                value = v;
                origin = scope.to_string();
            }
        }
    }
    (value, origin)
}

async fn get_config_row(pool: &PgPool, scope: &str, scope_key: &str) -> DbResult<Option<SnapshotConfigRow>> {
    let row = sqlx::query_as::<_, SnapshotConfigRow>(
        r#"
        SELECT scope, scope_key, enabled, retention_manual_days, retention_auto_days,
               trigger_drop_table, trigger_drop_column, trigger_truncate_table, trigger_delete_all_rows
        FROM snapshot_configs WHERE scope = $1 AND scope_key = $2
        "#,
    )
    .bind(scope)
    .bind(scope_key)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Folds the four scopes (narrowest wins per-field) into one effective
/// configuration, discarding provenance. Most call sites only need the
/// effective policy; use `resolve_snapshot_config_with_origins` when the
/// inheritance map itself is wanted.
pub async fn resolve_snapshot_config(
    pool: &PgPool,
    project_id: &str,
    bucket_name: &str,
    table_name: &str,
) -> DbResult<EffectiveSnapshotConfig> {
    Ok(resolve_snapshot_config_with_origins(pool, project_id, bucket_name, table_name)
        .await?
        .effective)
}

/// Same fold as `resolve_snapshot_config`, but also returns the
/// per-field inheritance map (§4.F: "returns both the effective value
/// and an inheritance map ... for explainability").
pub async fn resolve_snapshot_config_with_origins(
    pool: &PgPool,
    project_id: &str,
    bucket_name: &str,
    table_name: &str,
) -> DbResult<ResolvedSnapshotConfig> {
    let system = get_config_row(pool, "system", "").await?;
    let project = get_config_row(pool, "project", project_id).await?;
    let bucket = get_config_row(pool, "bucket", &format!("{project_id}/{bucket_name}")).await?;
    let table = get_config_row(pool, "table", &format!("{project_id}/{bucket_name}/{table_name}")).await?;

    let rows: Vec<(&str, &Option<SnapshotConfigRow>)> =
        vec![("system", &system), ("project", &project), ("bucket", &bucket), ("table", &table)];

    let (enabled, enabled_origin) = fold_field(true, &rows, |r| r.enabled);
    let (retention_manual_days, retention_manual_days_origin) = fold_field(90, &rows, |r| r.retention_manual_days);
    let (retention_auto_days, retention_auto_days_origin) = fold_field(7, &rows, |r| r.retention_auto_days);
    let (trigger_drop_table, trigger_drop_table_origin) = fold_field(true, &rows, |r| r.trigger_drop_table);
    let (trigger_drop_column, trigger_drop_column_origin) = fold_field(true, &rows, |r| r.trigger_drop_column);
    let (trigger_truncate_table, trigger_truncate_table_origin) = fold_field(false, &rows, |r| r.trigger_truncate_table);
    let (trigger_delete_all_rows, trigger_delete_all_rows_origin) = fold_field(false, &rows, |r| r.trigger_delete_all_rows);

    Ok(ResolvedSnapshotConfig {
        effective: EffectiveSnapshotConfig {
            enabled,
            retention_manual_days,
            retention_auto_days,
            trigger_drop_table,
            trigger_drop_column,
            trigger_truncate_table,
            trigger_delete_all_rows,
        },
        inheritance: SnapshotConfigInheritance {
            enabled: enabled_origin,
            retention_manual_days: retention_manual_days_origin,
            retention_auto_days: retention_auto_days_origin,
            trigger_drop_table: trigger_drop_table_origin,
            trigger_drop_column: trigger_drop_column_origin,
            trigger_truncate_table: trigger_truncate_table_origin,
            trigger_delete_all_rows: trigger_delete_all_rows_origin,
        },
    })
}

/// Upserts one scope's overrides. `scope_key` follows the convention used
/// by `resolve_snapshot_config` (`""`, `project_id`, `project_id/bucket`,
/// `project_id/bucket/table`).
#[allow(clippy::too_many_arguments)]
pub async fn set_snapshot_config(
    pool: &PgPool,
    scope: &str,
    scope_key: &str,
    enabled: Option<bool>,
    retention_manual_days: Option<i32>,
    retention_auto_days: Option<i32>,
    trigger_drop_table: Option<bool>,
    trigger_drop_column: Option<bool>,
    trigger_truncate_table: Option<bool>,
    trigger_delete_all_rows: Option<bool>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO snapshot_configs (
            scope, scope_key, enabled, retention_manual_days, retention_auto_days,
            trigger_drop_table, trigger_drop_column, trigger_truncate_table, trigger_delete_all_rows, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        ON CONFLICT (scope, scope_key) DO UPDATE SET
            enabled = $3, retention_manual_days = $4, retention_auto_days = $5,
            trigger_drop_table = $6, trigger_drop_column = $7,
            trigger_truncate_table = $8, trigger_delete_all_rows = $9, updated_at = $10
        "#,
    )
    .bind(scope)
    .bind(scope_key)
    .bind(enabled)
    .bind(retention_manual_days)
    .bind(retention_auto_days)
    .bind(trigger_drop_table)
    .bind(trigger_drop_column)
    .bind(trigger_truncate_table)
    .bind(trigger_delete_all_rows)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}
