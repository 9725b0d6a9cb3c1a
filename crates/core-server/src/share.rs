//! Share / link engine (component H).
//!
//! Sharing a bucket is metadata-only: it just records which target
//! project may link it. Linking is the part that touches the engine —
//! it builds one DuckDB file per linked bucket that `ATTACH`es every
//! source table read-only and exposes it as a same-named view, so
//! queries against the linked bucket read straight through to the
//! source project's files without a copy.

use duckdb::{params, Connection};
use sqlx::PgPool;

use crate::engine::{self, sql};
use crate::error::AppError;
use crate::metadata::buckets as bucket_db;
use crate::metadata::models::BucketShareRow;
use crate::metadata::shares as share_db;
use crate::paths::PathResolver;

pub fn share_role_name(source_project_id: &str, source_bucket: &str) -> String {
    format!("share_{source_project_id}_{source_bucket}")
}

/// Records a share. No filesystem change — linking is what touches
/// the engine.
pub async fn share(
    pool: &PgPool,
    source_project_id: &str,
    source_bucket: &str,
    target_project_id: &str,
) -> Result<(BucketShareRow, String), AppError> {
    bucket_db::get_bucket(pool, source_project_id, None, source_bucket).await?;
    let row = share_db::create_share(pool, source_project_id, source_bucket, target_project_id).await?;
    let role_name = share_role_name(source_project_id, source_bucket);
    Ok((row, role_name))
}

fn alias_for(table_name: &str) -> String {
    format!("src_{table_name}")
}

/// Attaches every table in the source bucket read-only into a fresh
/// link catalog file and creates a same-named view per table in the
/// target bucket. Returns the list of view (table) names created.
pub async fn link(
    pool: &PgPool,
    paths: &PathResolver,
    target_project_id: &str,
    target_bucket: &str,
    source_project_id: &str,
    source_bucket: &str,
) -> Result<Vec<String>, AppError> {
    share_db::get_share(pool, source_project_id, source_bucket, target_project_id).await?;
    bucket_db::get_bucket(pool, source_project_id, None, source_bucket).await?;

    if bucket_db::get_bucket(pool, target_project_id, None, target_bucket).await.is_ok() {
        return Err(AppError::Conflict(format!("bucket '{target_bucket}' already exists")));
    }
    if share_db::get_bucket_link(pool, target_project_id, target_bucket).await.is_ok() {
        return Err(AppError::Conflict(format!("bucket '{target_bucket}' is already linked")));
    }

    let source_tables = bucket_db::list_tables(pool, source_project_id, None, source_bucket).await?;
    if source_tables.is_empty() {
        return Err(AppError::Validation("source bucket has no tables to link".into()));
    }

    let link_path = paths.link_catalog_file(target_project_id, None, target_bucket)?;
    crate::paths::ensure_parent_dir(&link_path)?;
    let conn = Connection::open(&link_path)?;

    let mut created = Vec::with_capacity(source_tables.len());
    for table in &source_tables {
        let source_file = paths.table_file(source_project_id, None, source_bucket, &table.table_name)?;
        let alias = alias_for(&table.table_name);
        conn.execute_batch(&format!(
            "ATTACH '{}' AS {} (READ_ONLY)",
            sql::escape_sql_literal(&source_file.to_string_lossy()),
            sql::quote_ident(&alias),
        ))?;
        conn.execute_batch(&format!(
            "CREATE VIEW {} AS SELECT * FROM {}.{}",
            sql::quote_ident(&table.table_name),
            sql::quote_ident(&alias),
            sql::quote_ident(engine::DATA_TABLE),
        ))?;
        created.push(table.table_name.clone());
    }
    drop(conn);

    let alias = format!("link_{target_project_id}_{target_bucket}");
    share_db::create_bucket_link(pool, target_project_id, target_bucket, source_project_id, source_bucket, &alias).await?;

    Ok(created)
}

/// Drops the link catalog file and metadata row. Each step tolerates
/// partial failure — a link that half-exists should still be fully
/// removable.
pub async fn unlink(pool: &PgPool, paths: &PathResolver, target_project_id: &str, target_bucket: &str) -> Result<(), AppError> {
    let link_row = share_db::get_bucket_link(pool, target_project_id, target_bucket).await?;

    if let Ok(link_path) = paths.link_catalog_file(target_project_id, None, target_bucket) {
        if let Err(e) = std::fs::remove_file(&link_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(error = %e, bucket = %target_bucket, "failed to remove link catalog file");
            }
        }
    }

    if let Err(e) = share_db::delete_bucket_link(pool, target_project_id, target_bucket).await {
        tracing::warn!(error = %e, bucket = %target_bucket, "failed to delete bucket_link row");
    }

    tracing::info!(
        target_bucket = %target_bucket,
        source_project = %link_row.source_project_id,
        source_bucket = %link_row.source_bucket,
        "unlinked bucket"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_name_format() {
        assert_eq!(share_role_name("proj1", "in_c_sales"), "share_proj1_in_c_sales");
    }

    #[test]
    fn alias_is_namespaced_per_table() {
        assert_eq!(alias_for("orders"), "src_orders");
    }
}
