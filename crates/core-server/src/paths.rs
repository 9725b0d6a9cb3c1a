//! Path resolver (component A).
//!
//! Pure mapping from (project, bucket, table, branch?) to an on-disk
//! file path under the deterministic layout of `<data_root>/duckdb/...`.
//! Every public function validates that identifiers are single path
//! segments before building a path, so callers cannot escape the data
//! root via `/`, `..`, or embedded NUL bytes.

use std::path::{Path, PathBuf};

use crate::error::AppError;

/// Validate that `segment` is safe to use as a single path component:
/// non-empty, no `/`, no `..`, no NUL byte.
pub fn validate_segment(segment: &str) -> Result<(), AppError> {
    if segment.is_empty() {
        return Err(AppError::Validation("path segment must not be empty".into()));
    }
    if segment == "." || segment == ".." {
        return Err(AppError::Validation(format!(
            "path segment '{segment}' is not allowed"
        )));
    }
    if segment.contains('/') || segment.contains('\\') || segment.contains('\0') {
        return Err(AppError::Validation(format!(
            "path segment '{segment}' contains disallowed characters"
        )));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct PathResolver {
    data_root: PathBuf,
}

impl PathResolver {
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
        }
    }

    fn duckdb_root(&self) -> PathBuf {
        self.data_root.join("duckdb")
    }

    /// Effective project directory: `project_<pid>` for main, or
    /// `project_<pid>_branch_<bid>` when a branch is given.
    pub fn project_dir(&self, project_id: &str, branch_id: Option<&str>) -> Result<PathBuf, AppError> {
        validate_segment(project_id)?;
        match branch_id {
            None => Ok(self.duckdb_root().join(format!("project_{project_id}"))),
            Some(bid) => {
                validate_segment(bid)?;
                Ok(self.duckdb_root().join(format!("project_{project_id}_branch_{bid}")))
            },
        }
    }

    pub fn bucket_dir(
        &self,
        project_id: &str,
        branch_id: Option<&str>,
        bucket: &str,
    ) -> Result<PathBuf, AppError> {
        validate_segment(bucket)?;
        Ok(self.project_dir(project_id, branch_id)?.join(bucket))
    }

    /// Path to a table's engine file. Does not imply the file exists.
    pub fn table_file(
        &self,
        project_id: &str,
        branch_id: Option<&str>,
        bucket: &str,
        table: &str,
    ) -> Result<PathBuf, AppError> {
        validate_segment(table)?;
        Ok(self
            .bucket_dir(project_id, branch_id, bucket)?
            .join(format!("{table}.duckdb")))
    }

    /// Workspaces always live under the main project directory (or the
    /// branch directory, if the workspace is branch-scoped), under
    /// `_workspaces/`.
    pub fn workspace_file(
        &self,
        project_id: &str,
        branch_id: Option<&str>,
        workspace_id: &str,
    ) -> Result<PathBuf, AppError> {
        validate_segment(workspace_id)?;
        Ok(self
            .project_dir(project_id, branch_id)?
            .join("_workspaces")
            .join(format!("{workspace_id}.duckdb")))
    }

    /// The single-file engine catalog backing a linked bucket: one
    /// DuckDB database per linked bucket holding an `ATTACH`ed alias
    /// per source table plus a view of the same name, rather than the
    /// one-file-per-table layout of an ordinary bucket.
    pub fn link_catalog_file(
        &self,
        project_id: &str,
        branch_id: Option<&str>,
        bucket: &str,
    ) -> Result<PathBuf, AppError> {
        Ok(self.bucket_dir(project_id, branch_id, bucket)?.join("_link.duckdb"))
    }

    pub fn snapshots_dir(&self) -> PathBuf {
        self.duckdb_root().join("_snapshots")
    }

    /// Flat-file object store backing the S3-compatible surface. Keys
    /// may contain `/` (they address a virtual hierarchy within the
    /// bucket) so, unlike the other resolvers, this does not go through
    /// `validate_segment` on the whole key — only the bucket name.
    pub fn s3_object_file(&self, bucket: &str, key: &str) -> Result<PathBuf, AppError> {
        validate_segment(bucket)?;
        if key.is_empty() || key.contains("..") || key.contains('\0') {
            return Err(AppError::Validation("invalid object key".into()));
        }
        let key = key.trim_start_matches('/');
        Ok(self.data_root.join("s3").join(bucket).join(key))
    }

    pub fn s3_bucket_dir(&self, bucket: &str) -> Result<PathBuf, AppError> {
        validate_segment(bucket)?;
        Ok(self.data_root.join("s3").join(bucket))
    }

    pub fn snapshot_file(&self, snapshot_id: &str) -> Result<PathBuf, AppError> {
        validate_segment(snapshot_id)?;
        Ok(self.snapshots_dir().join(format!("{snapshot_id}.duckdb")))
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }
}

pub fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_traversal() {
        let resolver = PathResolver::new("/data");
        assert!(resolver.table_file("p1", None, "bucket", "../evil").is_err());
        assert!(resolver.table_file("p1", None, "../../etc", "t").is_err());
    }

    #[test]
    fn main_table_path() {
        let resolver = PathResolver::new("/data");
        let p = resolver.table_file("p1", None, "in_c_sales", "orders").unwrap();
        assert_eq!(p, PathBuf::from("/data/duckdb/project_p1/in_c_sales/orders.duckdb"));
    }

    #[test]
    fn branch_table_path() {
        let resolver = PathResolver::new("/data");
        let p = resolver
            .table_file("p1", Some("ab12cd34"), "in_c_sales", "orders")
            .unwrap();
        assert_eq!(
            p,
            PathBuf::from("/data/duckdb/project_p1_branch_ab12cd34/in_c_sales/orders.duckdb")
        );
    }

    #[test]
    fn workspace_path() {
        let resolver = PathResolver::new("/data");
        let p = resolver.workspace_file("p1", None, "ws_abc123").unwrap();
        assert_eq!(
            p,
            PathBuf::from("/data/duckdb/project_p1/_workspaces/ws_abc123.duckdb")
        );
    }
}
