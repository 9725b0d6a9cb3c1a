//! Row types for the metadata store (component C).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sentinel used in place of NULL for "main" scope in columns that
/// participate in composite primary keys (`branch_id`).
pub const MAIN_BRANCH: &str = "";

pub fn branch_key(branch_id: Option<&str>) -> &str {
    branch_id.unwrap_or(MAIN_BRANCH)
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ProjectRow {
    pub id: String,
    pub display_name: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct BranchRow {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ProjectFileRow {
    pub id: Uuid,
    pub project_id: String,
    pub object_key: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub size_bytes: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct BucketRow {
    pub project_id: String,
    pub branch_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub r#type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub ordinal_position: i32,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TableRow {
    pub project_id: String,
    pub branch_id: String,
    pub bucket_name: String,
    pub table_name: String,
    pub columns: serde_json::Value,
    pub primary_key: serde_json::Value,
    pub row_count: i64,
    pub size_bytes: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct ApiKeyRow {
    pub id: Uuid,
    pub project_id: Option<String>,
    pub branch_id: Option<String>,
    pub scope: String,
    pub key_hash: String,
    pub key_prefix: String,
    pub description: Option<String>,
    pub revoked: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct WorkspaceRow {
    pub id: String,
    pub project_id: String,
    pub branch_id: Option<String>,
    pub name: String,
    pub db_path: String,
    pub size_limit_bytes: i64,
    pub status: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct WorkspaceCredentialsRow {
    pub workspace_id: String,
    pub username: String,
    pub password_hash: String,
    pub rotated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct PgWireSessionRow {
    pub session_id: Uuid,
    pub workspace_id: String,
    pub client_ip: String,
    pub connected_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub query_count: i64,
    pub status: String,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct BucketShareRow {
    pub id: Uuid,
    pub source_project_id: String,
    pub source_bucket: String,
    pub target_project_id: String,
    pub share_type: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct BucketLinkRow {
    pub target_project_id: String,
    pub target_bucket: String,
    pub source_project_id: String,
    pub source_bucket: String,
    pub attached_db_alias: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct SnapshotRow {
    pub id: Uuid,
    pub project_id: String,
    pub branch_id: Option<String>,
    pub bucket_name: String,
    pub table_name: String,
    pub snapshot_type: String,
    pub description: Option<String>,
    pub row_count_at_capture: i64,
    pub file_path: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SnapshotConfigRow {
    pub scope: String,
    pub scope_key: String,
    pub enabled: Option<bool>,
    pub retention_manual_days: Option<i32>,
    pub retention_auto_days: Option<i32>,
    pub trigger_drop_table: Option<bool>,
    pub trigger_drop_column: Option<bool>,
    pub trigger_truncate_table: Option<bool>,
    pub trigger_delete_all_rows: Option<bool>,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize)]
pub struct OperationLogRow {
    pub id: i64,
    pub operation: String,
    pub status: String,
    pub project_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub request_id: Option<String>,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}
