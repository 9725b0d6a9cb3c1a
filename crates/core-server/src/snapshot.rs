//! Snapshot orchestration (component F): manual capture, restore, and
//! the automatic triggers that fire out of the engine's destructive
//! operations. The DB-level bookkeeping (rows, hierarchical config
//! resolution) lives in `metadata::snapshots`; this module owns the
//! file copy and the lock discipline around it.

use std::path::Path;

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::locks::{TableKey, TableLockManager};
use crate::metadata::models::SnapshotRow;
use crate::metadata::snapshots as snapshot_db;
use crate::paths::PathResolver;

/// What caused a snapshot to be taken, mirroring `snapshot_type` in the
/// catalog (`"manual"` or one of the `auto_*` variants).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotTrigger {
    Manual,
    AutoDropTable,
    AutoDropColumn,
    AutoTruncateTable,
    AutoDeleteAllRows,
}

impl SnapshotTrigger {
    fn snapshot_type(self) -> &'static str {
        match self {
            SnapshotTrigger::Manual => "manual",
            SnapshotTrigger::AutoDropTable => "auto_predrop",
            SnapshotTrigger::AutoDropColumn => "auto_predrop_column",
            SnapshotTrigger::AutoTruncateTable => "auto_pretruncate",
            SnapshotTrigger::AutoDeleteAllRows => "auto_predelete_all",
        }
    }

    fn description(self) -> Option<&'static str> {
        match self {
            SnapshotTrigger::Manual => None,
            SnapshotTrigger::AutoDropTable => Some("automatic snapshot before drop_table"),
            SnapshotTrigger::AutoDropColumn => Some("automatic snapshot before drop_column"),
            SnapshotTrigger::AutoTruncateTable => Some("automatic snapshot before truncate"),
            SnapshotTrigger::AutoDeleteAllRows => Some("automatic snapshot before delete-all"),
        }
    }

    fn retention_days(self, retention_manual_days: i32, retention_auto_days: i32) -> i64 {
        match self {
            SnapshotTrigger::Manual => retention_manual_days as i64,
            _ => retention_auto_days as i64,
        }
    }
}

/// Copies the table's current file into the snapshot store and records
/// the catalog row. Caller must already hold the table's lock — this
/// function never acquires one itself, since both manual capture and
/// the auto-trigger hooks run inside an already-locked operation.
#[allow(clippy::too_many_arguments)]
pub async fn capture(
    pool: &PgPool,
    paths: &PathResolver,
    project_id: &str,
    branch_id: Option<&str>,
    bucket_name: &str,
    table_name: &str,
    trigger: SnapshotTrigger,
    description: Option<&str>,
) -> Result<SnapshotRow, AppError> {
    let table_path = paths.table_file(project_id, branch_id, bucket_name, table_name)?;
    if !table_path.exists() {
        return Err(AppError::NotFound(format!("table '{table_name}' has no data file to snapshot")));
    }

    let config = snapshot_db::resolve_snapshot_config(pool, project_id, bucket_name, table_name).await?;
    if !config.enabled {
        return Err(AppError::Validation("snapshots are disabled for this table".into()));
    }

    let row_count = crate::engine::get_table_info(&table_path)?.row_count;

    let snapshot_id = Uuid::new_v4();
    let snapshot_path = paths.snapshot_file(&snapshot_id.to_string())?;
    crate::paths::ensure_parent_dir(&snapshot_path)?;
    std::fs::copy(&table_path, &snapshot_path)?;

    let retention_days = trigger.retention_days(config.retention_manual_days, config.retention_auto_days);
    let description = description.or_else(|| trigger.description());

    let row = snapshot_db::create_snapshot(
        pool,
        project_id,
        branch_id,
        bucket_name,
        table_name,
        trigger.snapshot_type(),
        description,
        row_count,
        &snapshot_path.to_string_lossy(),
        retention_days,
    )
    .await;

    match row {
        Ok(row) => Ok(row),
        Err(e) => {
            let _ = std::fs::remove_file(&snapshot_path);
            Err(AppError::from(e))
        },
    }
}

/// Checks the resolved snapshot config and, if the given trigger is
/// enabled, captures a snapshot before the caller proceeds with its
/// destructive operation. Swallows `NotFound` (nothing to snapshot yet)
/// since an auto-trigger must never block the operation it guards.
pub async fn maybe_auto_snapshot(
    pool: &PgPool,
    paths: &PathResolver,
    project_id: &str,
    branch_id: Option<&str>,
    bucket_name: &str,
    table_name: &str,
    trigger: SnapshotTrigger,
) -> Result<(), AppError> {
    let config = snapshot_db::resolve_snapshot_config(pool, project_id, bucket_name, table_name).await?;
    if !config.enabled {
        return Ok(());
    }
    let should_fire = match trigger {
        SnapshotTrigger::Manual => true,
        SnapshotTrigger::AutoDropTable => config.trigger_drop_table,
        SnapshotTrigger::AutoDropColumn => config.trigger_drop_column,
        SnapshotTrigger::AutoTruncateTable => config.trigger_truncate_table,
        SnapshotTrigger::AutoDeleteAllRows => config.trigger_delete_all_rows,
    };
    if !should_fire {
        return Ok(());
    }
    match capture(pool, paths, project_id, branch_id, bucket_name, table_name, trigger, None).await {
        Ok(_) | Err(AppError::NotFound(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Outcome of a restore: the live row count of the restored file and the
/// table it was written to (the original table, or `target_table` when
/// one was given).
#[derive(Debug, Clone, serde::Serialize)]
pub struct RestoreResult {
    pub row_count: i64,
    pub restored_to: String,
}

/// Restores a table's file from a snapshot. With no `target_table`, this
/// overwrites the original bucket/table. With `target_table`, the
/// snapshot is written to a new table in the same bucket instead,
/// registered fresh in the catalog with the original table's schema —
/// the original is never touched. Caller must hold the relevant table's
/// lock.
pub async fn restore(
    pool: &PgPool,
    paths: &PathResolver,
    snapshot_id: Uuid,
    target_table: Option<&str>,
) -> Result<RestoreResult, AppError> {
    let row = snapshot_db::get_snapshot(pool, snapshot_id).await?;
    let branch_id = row.branch_id.as_deref().filter(|b| !b.is_empty());
    let dest_table_name = target_table.unwrap_or(&row.table_name);
    let dest = paths.table_file(&row.project_id, branch_id, &row.bucket_name, dest_table_name)?;
    let source = Path::new(&row.file_path);
    if !source.exists() {
        return Err(AppError::NotFound("snapshot file is missing on disk".into()));
    }
    crate::paths::ensure_parent_dir(&dest)?;
    std::fs::copy(source, &dest)?;

    let table_info = crate::engine::get_table_info(&dest)?;

    if let Some(new_name) = target_table {
        let original = crate::metadata::buckets::get_table(pool, &row.project_id, branch_id, &row.bucket_name, &row.table_name).await?;
        crate::metadata::buckets::create_table(
            pool,
            &row.project_id,
            branch_id,
            &row.bucket_name,
            new_name,
            original.columns,
            original.primary_key,
        )
        .await?;
    }

    crate::metadata::buckets::update_table_stats(
        pool,
        &row.project_id,
        branch_id,
        &row.bucket_name,
        dest_table_name,
        table_info.row_count,
        table_info.size_bytes,
    )
    .await?;

    Ok(RestoreResult { row_count: table_info.row_count, restored_to: dest_table_name.to_string() })
}

/// Runs the retention GC pass: deletes every catalog row whose
/// `expires_at` has passed, and removes the corresponding file. Called
/// periodically from the background jobs loop.
pub async fn run_retention_gc(pool: &PgPool) -> Result<usize, AppError> {
    let expired = snapshot_db::cleanup_expired_snapshots(pool).await?;
    let mut removed = 0;
    for row in &expired {
        if std::fs::remove_file(&row.file_path).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

/// Acquires the table lock and captures a manual snapshot, for the HTTP
/// handler path where the caller has not already taken the lock.
#[allow(clippy::too_many_arguments)]
pub async fn capture_manual_with_lock(
    pool: &PgPool,
    paths: &PathResolver,
    locks: &TableLockManager,
    lock_timeout: std::time::Duration,
    project_id: &str,
    branch_id: Option<&str>,
    bucket_name: &str,
    table_name: &str,
    description: Option<&str>,
) -> Result<SnapshotRow, AppError> {
    let key = TableKey::new(project_id, branch_id.map(str::to_string), bucket_name, table_name);
    let _guard = locks.acquire(&key, lock_timeout).await?;
    capture(
        pool,
        paths,
        project_id,
        branch_id,
        bucket_name,
        table_name,
        SnapshotTrigger::Manual,
        description,
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_trigger_uses_manual_retention() {
        assert_eq!(SnapshotTrigger::Manual.retention_days(30, 7), 30);
        assert_eq!(SnapshotTrigger::AutoDropTable.retention_days(30, 7), 7);
    }

    #[test]
    fn snapshot_type_mapping() {
        assert_eq!(SnapshotTrigger::Manual.snapshot_type(), "manual");
        assert_eq!(SnapshotTrigger::AutoDeleteAllRows.snapshot_type(), "auto_predelete_all");
    }
}
