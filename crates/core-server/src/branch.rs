//! Branch / copy-on-write engine (component G).
//!
//! Branches read main until they write: the first write to a table
//! copies it into the branch's own directory tree, recorded in
//! `branch_copied_tables`. Reads fall back to main for any table the
//! branch has not yet copied; the core never writes through to main
//! under a branch.

use std::time::Duration;

use sqlx::PgPool;

use crate::error::AppError;
use crate::locks::{TableKey, TableLockManager};
use crate::metadata::projects as project_db;
use crate::paths::PathResolver;

/// Resolves which file a read should target: the branch's own copy if
/// one has been made, else main. `branch_id` of `None` always means main.
pub async fn resolve_read_path(
    pool: &PgPool,
    paths: &PathResolver,
    project_id: &str,
    branch_id: Option<&str>,
    bucket: &str,
    table: &str,
) -> Result<std::path::PathBuf, AppError> {
    let Some(bid) = branch_id else {
        return paths.table_file(project_id, None, bucket, table);
    };
    if project_db::is_table_in_branch(pool, bid, bucket, table).await? {
        paths.table_file(project_id, Some(bid), bucket, table)
    } else {
        paths.table_file(project_id, None, bucket, table)
    }
}

/// Ensures the branch owns a writable copy of the table, copying it
/// from main on first write. Returns whether a copy was just performed
/// (`false` means the branch already owned one). Caller must hold the
/// table's lock keyed to `(project_id, branch_id, bucket, table)`.
pub async fn ensure_table_in_branch(
    pool: &PgPool,
    paths: &PathResolver,
    project_id: &str,
    branch_id: &str,
    bucket: &str,
    table: &str,
) -> Result<bool, AppError> {
    if project_db::is_table_in_branch(pool, branch_id, bucket, table).await? {
        return Ok(false);
    }

    let main_path = paths.table_file(project_id, None, bucket, table)?;
    if !main_path.exists() {
        return Err(AppError::NotFound(format!("table '{table}' not found")));
    }

    let branch_path = paths.table_file(project_id, Some(branch_id), bucket, table)?;
    crate::paths::ensure_parent_dir(&branch_path)?;
    std::fs::copy(&main_path, &branch_path)?;

    project_db::mark_table_copied_to_branch(pool, branch_id, bucket, table).await?;
    Ok(true)
}

/// Acquires the table's lock and calls `ensure_table_in_branch` — the
/// entry point every branch-scoped write operation calls before
/// touching the engine file.
pub async fn ensure_table_in_branch_locked(
    pool: &PgPool,
    paths: &PathResolver,
    locks: &TableLockManager,
    lock_timeout: Duration,
    project_id: &str,
    branch_id: &str,
    bucket: &str,
    table: &str,
) -> Result<bool, AppError> {
    let key = TableKey::new(project_id, Some(branch_id.to_string()), bucket, table);
    let _guard = locks.acquire(&key, lock_timeout).await?;
    ensure_table_in_branch(pool, paths, project_id, branch_id, bucket, table).await
}

/// Evicts the branch's copy of a table so it reads through to main
/// again. A no-op success if the branch never copied the table.
pub async fn pull(
    pool: &PgPool,
    paths: &PathResolver,
    project_id: &str,
    branch_id: &str,
    bucket: &str,
    table: &str,
) -> Result<bool, AppError> {
    if !project_db::is_table_in_branch(pool, branch_id, bucket, table).await? {
        return Ok(false);
    }
    let branch_path = paths.table_file(project_id, Some(branch_id), bucket, table)?;
    if branch_path.exists() {
        std::fs::remove_file(&branch_path)?;
    }
    sqlx::query("DELETE FROM branch_copied_tables WHERE branch_id = $1 AND bucket_name = $2 AND table_name = $3")
        .bind(branch_id)
        .bind(bucket)
        .bind(table)
        .execute(pool)
        .await
        .map_err(crate::db::DbError::from)?;
    Ok(true)
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BranchStats {
    pub file_count: u64,
    pub total_size_bytes: u64,
}

/// Walks the branch's directory tree and totals file count and size.
/// Returns all-zero stats if the branch has never copied a table (its
/// directory need not exist yet).
pub fn branch_stats(paths: &PathResolver, project_id: &str, branch_id: &str) -> Result<BranchStats, AppError> {
    let dir = paths.project_dir(project_id, Some(branch_id))?;
    if !dir.exists() {
        return Ok(BranchStats { file_count: 0, total_size_bytes: 0 });
    }
    let mut file_count = 0u64;
    let mut total_size_bytes = 0u64;
    let mut stack = vec![dir];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                file_count += 1;
                total_size_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
    }
    Ok(BranchStats { file_count, total_size_bytes })
}

/// Deletes the branch's entire directory tree and catalog row. The
/// directory may not exist if the branch never took a write.
pub async fn delete_branch(pool: &PgPool, paths: &PathResolver, project_id: &str, branch_id: &str) -> Result<(), AppError> {
    let dir = paths.project_dir(project_id, Some(branch_id))?;
    if dir.exists() {
        std::fs::remove_dir_all(&dir)?;
    }
    sqlx::query("DELETE FROM branch_copied_tables WHERE branch_id = $1")
        .bind(branch_id)
        .execute(pool)
        .await
        .map_err(crate::db::DbError::from)?;
    project_db::delete_branch(pool, branch_id).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn branch_stats_on_missing_dir_is_zero() {
        let paths = PathResolver::new("/tmp/nonexistent-storage-core-test-root");
        let stats = branch_stats(&paths, "p1", "b1").unwrap();
        assert_eq!(stats.file_count, 0);
        assert_eq!(stats.total_size_bytes, 0);
    }
}
