//! Bucket and table routes: the data-plane surface that actually
//! touches per-table engine files. Every write path resolves the
//! branch's copy-on-write state and takes the table's exclusive lock
//! before calling into `engine`.

use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::api::response::{ApiResponse, ApiResult};
use crate::engine::{self, profile::ProfileOptions, AlterColumnChange, DedupMode, ExportFormat, ExportOptions, ImportFormat, ImportOptions, RemoteCredentials};
use crate::error::AppError;
use crate::features::shared::auth_extract;
use crate::locks::TableKey;
use crate::metadata::{buckets as bucket_db, models::ColumnDef};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:pid/buckets", get(list_buckets).post(create_bucket))
        .route("/:pid/buckets/:bucket", get(get_bucket).delete(delete_bucket))
        .route("/:pid/buckets/:bucket/tables", get(list_tables).post(create_table))
        .route("/:pid/buckets/:bucket/tables/:table", get(get_table).delete(delete_table))
        .route("/:pid/buckets/:bucket/tables/:table/preview", get(preview_table))
        .route("/:pid/buckets/:bucket/tables/:table/profile", get(profile_table))
        .route("/:pid/buckets/:bucket/tables/:table/columns", axum::routing::post(add_column))
        .route(
            "/:pid/buckets/:bucket/tables/:table/columns/:column",
            axum::routing::patch(alter_column).delete(drop_column),
        )
        .route(
            "/:pid/buckets/:bucket/tables/:table/primary-key",
            axum::routing::post(add_primary_key).delete(drop_primary_key),
        )
        .route("/:pid/buckets/:bucket/tables/:table/rows", axum::routing::delete(delete_rows))
        .route("/:pid/buckets/:bucket/tables/:table/import/file", axum::routing::post(import_file))
        .route("/:pid/buckets/:bucket/tables/:table/export", axum::routing::post(export_table))
}

#[derive(Debug, Deserialize, Default)]
struct BranchQuery {
    branch_id: Option<String>,
}

async fn authorize_write(state: &AppState, headers: &HeaderMap, pid: &str, branch_id: Option<&str>) -> Result<(), AppError> {
    let key = auth_extract::credential(headers)?;
    let identity = match branch_id {
        Some(bid) => crate::auth::authorize_branch(&state.db, &state.config.storage_core.admin_secret, &key, pid, bid).await?,
        None => crate::auth::authorize_project(&state.db, &state.config.storage_core.admin_secret, &key, pid).await?,
    };
    if !crate::auth::can_write_branch(&identity, branch_id) {
        return Err(AppError::Authorization("credential cannot write to this branch".into()));
    }
    Ok(())
}

async fn authorize_read(state: &AppState, headers: &HeaderMap, pid: &str) -> Result<(), AppError> {
    crate::auth::authorize_project(&state.db, &state.config.storage_core.admin_secret, &auth_extract::credential(headers)?, pid).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct CreateBucketRequest {
    name: String,
}

async fn create_bucket(
    State(state): State<AppState>,
    Path(pid): Path<String>,
    Query(q): Query<BranchQuery>,
    headers: HeaderMap,
    Json(req): Json<CreateBucketRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_write(&state, &headers, &pid, q.branch_id.as_deref()).await?;
    let row = bucket_db::create_bucket(&state.db, &pid, q.branch_id.as_deref(), &req.name).await?;
    Ok(ApiResponse::success(row))
}

async fn list_buckets(
    State(state): State<AppState>,
    Path(pid): Path<String>,
    Query(q): Query<BranchQuery>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_read(&state, &headers, &pid).await?;
    let rows = bucket_db::list_buckets(&state.db, &pid, q.branch_id.as_deref()).await?;
    Ok(ApiResponse::success(rows))
}

async fn get_bucket(
    State(state): State<AppState>,
    Path((pid, bucket)): Path<(String, String)>,
    Query(q): Query<BranchQuery>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_read(&state, &headers, &pid).await?;
    let row = bucket_db::get_bucket(&state.db, &pid, q.branch_id.as_deref(), &bucket).await?;
    Ok(ApiResponse::success(row))
}

async fn delete_bucket(
    State(state): State<AppState>,
    Path((pid, bucket)): Path<(String, String)>,
    Query(q): Query<BranchQuery>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_write(&state, &headers, &pid, q.branch_id.as_deref()).await?;
    let dir = state.paths.bucket_dir(&pid, q.branch_id.as_deref(), &bucket)?;
    if dir.exists() {
        std::fs::remove_dir_all(&dir)?;
    }
    bucket_db::delete_bucket(&state.db, &pid, q.branch_id.as_deref(), &bucket).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct CreateTableRequest {
    name: String,
    columns: Vec<ColumnDef>,
    #[serde(default)]
    primary_key: Vec<String>,
}

async fn create_table(
    State(state): State<AppState>,
    Path((pid, bucket)): Path<(String, String)>,
    Query(q): Query<BranchQuery>,
    headers: HeaderMap,
    Json(req): Json<CreateTableRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_write(&state, &headers, &pid, q.branch_id.as_deref()).await?;
    bucket_db::get_bucket(&state.db, &pid, q.branch_id.as_deref(), &bucket).await?;

    let key = TableKey::new(pid.clone(), q.branch_id.clone(), bucket.clone(), req.name.clone());
    let _guard = state.locks.acquire(&key, state.lock_timeout()).await?;

    let path = state.paths.table_file(&pid, q.branch_id.as_deref(), &bucket, &req.name)?;
    engine::create_table(&path, &req.columns, &req.primary_key)?;

    let row = bucket_db::create_table(
        &state.db,
        &pid,
        q.branch_id.as_deref(),
        &bucket,
        &req.name,
        serde_json::to_value(&req.columns).unwrap_or(serde_json::Value::Null),
        serde_json::to_value(&req.primary_key).unwrap_or(serde_json::Value::Null),
    )
    .await;

    let row = match row {
        Ok(row) => row,
        Err(e) => {
            let _ = engine::drop_table(&path);
            return Err(AppError::from(e));
        },
    };

    Ok(ApiResponse::success(row))
}

async fn list_tables(
    State(state): State<AppState>,
    Path((pid, bucket)): Path<(String, String)>,
    Query(q): Query<BranchQuery>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_read(&state, &headers, &pid).await?;
    let rows = bucket_db::list_tables(&state.db, &pid, q.branch_id.as_deref(), &bucket).await?;
    Ok(ApiResponse::success(rows))
}

async fn resolved_path(state: &AppState, pid: &str, branch_id: Option<&str>, bucket: &str, table: &str) -> Result<std::path::PathBuf, AppError> {
    crate::branch::resolve_read_path(&state.db, &state.paths, pid, branch_id, bucket, table).await
}

async fn get_table(
    State(state): State<AppState>,
    Path((pid, bucket, table)): Path<(String, String, String)>,
    Query(q): Query<BranchQuery>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_read(&state, &headers, &pid).await?;
    let row = bucket_db::get_table(&state.db, &pid, q.branch_id.as_deref(), &bucket, &table).await?;
    Ok(ApiResponse::success(row))
}

async fn delete_table(
    State(state): State<AppState>,
    Path((pid, bucket, table)): Path<(String, String, String)>,
    Query(q): Query<BranchQuery>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_write(&state, &headers, &pid, q.branch_id.as_deref()).await?;
    let key = TableKey::new(pid.clone(), q.branch_id.clone(), bucket.clone(), table.clone());
    let _guard = state.locks.acquire(&key, state.lock_timeout()).await?;

    crate::snapshot::maybe_auto_snapshot(
        &state.db,
        &state.paths,
        &pid,
        q.branch_id.as_deref(),
        &bucket,
        &table,
        crate::snapshot::SnapshotTrigger::AutoDropTable,
    )
    .await?;

    let path = state.paths.table_file(&pid, q.branch_id.as_deref(), &bucket, &table)?;
    engine::drop_table(&path)?;
    bucket_db::delete_table(&state.db, &pid, q.branch_id.as_deref(), &bucket, &table).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct PreviewQuery {
    #[serde(default = "default_preview_limit")]
    limit: i64,
    branch_id: Option<String>,
}

fn default_preview_limit() -> i64 {
    100
}

async fn preview_table(
    State(state): State<AppState>,
    Path((pid, bucket, table)): Path<(String, String, String)>,
    Query(q): Query<PreviewQuery>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_read(&state, &headers, &pid).await?;
    let path = resolved_path(&state, &pid, q.branch_id.as_deref(), &bucket, &table).await?;
    let result = engine::preview(&path, q.limit)?;
    Ok(ApiResponse::success(result))
}

#[derive(Debug, Deserialize, Default)]
struct ProfileQuery {
    branch_id: Option<String>,
    columns: Option<String>,
    #[serde(default)]
    histogram: bool,
}

async fn profile_table(
    State(state): State<AppState>,
    Path((pid, bucket, table)): Path<(String, String, String)>,
    Query(q): Query<ProfileQuery>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_read(&state, &headers, &pid).await?;
    let path = resolved_path(&state, &pid, q.branch_id.as_deref(), &bucket, &table).await?;
    let options = ProfileOptions {
        columns: q.columns.map(|c| c.split(',').map(str::to_string).collect()),
        include_histogram: q.histogram,
        histogram_buckets: 10,
    };
    let result = engine::profile::profile(&path, &options)?;
    Ok(ApiResponse::success(result))
}

async fn add_column(
    State(state): State<AppState>,
    Path((pid, bucket, table)): Path<(String, String, String)>,
    Query(q): Query<BranchQuery>,
    headers: HeaderMap,
    Json(column): Json<ColumnDef>,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_write(&state, &headers, &pid, q.branch_id.as_deref()).await?;
    let key = TableKey::new(pid.clone(), q.branch_id.clone(), bucket.clone(), table.clone());
    let _guard = state.locks.acquire(&key, state.lock_timeout()).await?;
    if let Some(bid) = &q.branch_id {
        crate::branch::ensure_table_in_branch(&state.db, &state.paths, &pid, bid, &bucket, &table).await?;
    }
    let path = state.paths.table_file(&pid, q.branch_id.as_deref(), &bucket, &table)?;
    engine::add_column(&path, &column)?;
    let info = engine::get_table_info(&path)?;
    let row = bucket_db::update_table_schema(
        &state.db,
        &pid,
        q.branch_id.as_deref(),
        &bucket,
        &table,
        serde_json::to_value(&info.columns).unwrap_or(serde_json::Value::Null),
        serde_json::to_value(&info.primary_key).unwrap_or(serde_json::Value::Null),
    )
    .await?;
    Ok(ApiResponse::success(row))
}

#[derive(Debug, Deserialize, Default)]
struct AlterColumnRequest {
    new_name: Option<String>,
    new_type: Option<String>,
    new_nullable: Option<bool>,
    new_default: Option<String>,
}

async fn alter_column(
    State(state): State<AppState>,
    Path((pid, bucket, table, column)): Path<(String, String, String, String)>,
    Query(q): Query<BranchQuery>,
    headers: HeaderMap,
    Json(req): Json<AlterColumnRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_write(&state, &headers, &pid, q.branch_id.as_deref()).await?;
    let key = TableKey::new(pid.clone(), q.branch_id.clone(), bucket.clone(), table.clone());
    let _guard = state.locks.acquire(&key, state.lock_timeout()).await?;
    if let Some(bid) = &q.branch_id {
        crate::branch::ensure_table_in_branch(&state.db, &state.paths, &pid, bid, &bucket, &table).await?;
    }
    let path = state.paths.table_file(&pid, q.branch_id.as_deref(), &bucket, &table)?;
    let change = AlterColumnChange {
        new_name: req.new_name,
        new_type: req.new_type,
        new_nullable: req.new_nullable,
        new_default: req.new_default,
    };
    engine::alter_column(&path, &column, &change)?;
    let info = engine::get_table_info(&path)?;
    let row = bucket_db::update_table_schema(
        &state.db,
        &pid,
        q.branch_id.as_deref(),
        &bucket,
        &table,
        serde_json::to_value(&info.columns).unwrap_or(serde_json::Value::Null),
        serde_json::to_value(&info.primary_key).unwrap_or(serde_json::Value::Null),
    )
    .await?;
    Ok(ApiResponse::success(row))
}

async fn drop_column(
    State(state): State<AppState>,
    Path((pid, bucket, table, column)): Path<(String, String, String, String)>,
    Query(q): Query<BranchQuery>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_write(&state, &headers, &pid, q.branch_id.as_deref()).await?;
    let key = TableKey::new(pid.clone(), q.branch_id.clone(), bucket.clone(), table.clone());
    let _guard = state.locks.acquire(&key, state.lock_timeout()).await?;
    if let Some(bid) = &q.branch_id {
        crate::branch::ensure_table_in_branch(&state.db, &state.paths, &pid, bid, &bucket, &table).await?;
    }

    crate::snapshot::maybe_auto_snapshot(
        &state.db,
        &state.paths,
        &pid,
        q.branch_id.as_deref(),
        &bucket,
        &table,
        crate::snapshot::SnapshotTrigger::AutoDropColumn,
    )
    .await?;

    let path = state.paths.table_file(&pid, q.branch_id.as_deref(), &bucket, &table)?;
    let info = engine::get_table_info(&path)?;
    engine::drop_column(&path, &column, &info.primary_key)?;
    let info = engine::get_table_info(&path)?;
    let row = bucket_db::update_table_schema(
        &state.db,
        &pid,
        q.branch_id.as_deref(),
        &bucket,
        &table,
        serde_json::to_value(&info.columns).unwrap_or(serde_json::Value::Null),
        serde_json::to_value(&info.primary_key).unwrap_or(serde_json::Value::Null),
    )
    .await?;
    Ok(ApiResponse::success(row))
}

#[derive(Debug, Deserialize)]
struct PrimaryKeyRequest {
    columns: Vec<String>,
}

async fn add_primary_key(
    State(state): State<AppState>,
    Path((pid, bucket, table)): Path<(String, String, String)>,
    Query(q): Query<BranchQuery>,
    headers: HeaderMap,
    Json(req): Json<PrimaryKeyRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_write(&state, &headers, &pid, q.branch_id.as_deref()).await?;
    let key = TableKey::new(pid.clone(), q.branch_id.clone(), bucket.clone(), table.clone());
    let _guard = state.locks.acquire(&key, state.lock_timeout()).await?;
    if let Some(bid) = &q.branch_id {
        crate::branch::ensure_table_in_branch(&state.db, &state.paths, &pid, bid, &bucket, &table).await?;
    }
    let path = state.paths.table_file(&pid, q.branch_id.as_deref(), &bucket, &table)?;
    engine::add_primary_key(&path, &req.columns)?;
    let info = engine::get_table_info(&path)?;
    let row = bucket_db::update_table_schema(
        &state.db,
        &pid,
        q.branch_id.as_deref(),
        &bucket,
        &table,
        serde_json::to_value(&info.columns).unwrap_or(serde_json::Value::Null),
        serde_json::to_value(&info.primary_key).unwrap_or(serde_json::Value::Null),
    )
    .await?;
    Ok(ApiResponse::success(row))
}

async fn drop_primary_key(
    State(state): State<AppState>,
    Path((pid, bucket, table)): Path<(String, String, String)>,
    Query(q): Query<BranchQuery>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_write(&state, &headers, &pid, q.branch_id.as_deref()).await?;
    let key = TableKey::new(pid.clone(), q.branch_id.clone(), bucket.clone(), table.clone());
    let _guard = state.locks.acquire(&key, state.lock_timeout()).await?;
    if let Some(bid) = &q.branch_id {
        crate::branch::ensure_table_in_branch(&state.db, &state.paths, &pid, bid, &bucket, &table).await?;
    }
    let path = state.paths.table_file(&pid, q.branch_id.as_deref(), &bucket, &table)?;
    engine::drop_primary_key(&path)?;
    let info = engine::get_table_info(&path)?;
    let row = bucket_db::update_table_schema(
        &state.db,
        &pid,
        q.branch_id.as_deref(),
        &bucket,
        &table,
        serde_json::to_value(&info.columns).unwrap_or(serde_json::Value::Null),
        serde_json::to_value(&info.primary_key).unwrap_or(serde_json::Value::Null),
    )
    .await?;
    Ok(ApiResponse::success(row))
}

#[derive(Debug, Deserialize)]
struct DeleteRowsRequest {
    #[serde(default)]
    where_clause: String,
}

async fn delete_rows(
    State(state): State<AppState>,
    Path((pid, bucket, table)): Path<(String, String, String)>,
    Query(q): Query<BranchQuery>,
    headers: HeaderMap,
    Json(req): Json<DeleteRowsRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_write(&state, &headers, &pid, q.branch_id.as_deref()).await?;
    let key = TableKey::new(pid.clone(), q.branch_id.clone(), bucket.clone(), table.clone());
    let _guard = state.locks.acquire(&key, state.lock_timeout()).await?;
    if let Some(bid) = &q.branch_id {
        crate::branch::ensure_table_in_branch(&state.db, &state.paths, &pid, bid, &bucket, &table).await?;
    }

    // Only a clause that deletes every row is truncation in disguise; a
    // partial delete never triggers a snapshot regardless of config.
    if engine::is_delete_all(&req.where_clause) {
        let config = crate::metadata::snapshots::resolve_snapshot_config(&state.db, &pid, &bucket, &table).await?;
        if config.trigger_truncate_table || config.trigger_delete_all_rows {
            let trigger = if config.trigger_truncate_table {
                crate::snapshot::SnapshotTrigger::AutoTruncateTable
            } else {
                crate::snapshot::SnapshotTrigger::AutoDeleteAllRows
            };
            crate::snapshot::maybe_auto_snapshot(&state.db, &state.paths, &pid, q.branch_id.as_deref(), &bucket, &table, trigger).await?;
        }
    }

    let path = state.paths.table_file(&pid, q.branch_id.as_deref(), &bucket, &table)?;
    let deleted = engine::delete_rows(&path, &req.where_clause)?;
    let info = engine::get_table_info(&path)?;
    bucket_db::update_table_stats(&state.db, &pid, q.branch_id.as_deref(), &bucket, &table, info.row_count, info.size_bytes).await?;
    Ok(ApiResponse::success(json!({ "deleted_rows": deleted })))
}

#[derive(Debug, Deserialize)]
struct ImportFileRequest {
    source_path: String,
    format: ImportFormatRequest,
    #[serde(default)]
    incremental: bool,
    #[serde(default)]
    dedup_mode: DedupModeRequest,
    credentials: Option<RemoteCredentialsRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ImportFormatRequest {
    Csv {
        #[serde(default = "default_comma")]
        delimiter: char,
        #[serde(default = "default_quote")]
        quote: char,
        #[serde(default = "default_quote")]
        escape: char,
        #[serde(default = "default_true")]
        header: bool,
    },
    Parquet,
}

fn default_comma() -> char {
    ','
}
fn default_quote() -> char {
    '"'
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum DedupModeRequest {
    #[default]
    AppendOnly,
    UpdateDuplicates,
}

#[derive(Debug, Deserialize)]
struct RemoteCredentialsRequest {
    access_key_id: String,
    secret_access_key: String,
    region: Option<String>,
    endpoint: Option<String>,
}

async fn import_file(
    State(state): State<AppState>,
    Path((pid, bucket, table)): Path<(String, String, String)>,
    Query(q): Query<BranchQuery>,
    headers: HeaderMap,
    Json(req): Json<ImportFileRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_write(&state, &headers, &pid, q.branch_id.as_deref()).await?;
    let key = TableKey::new(pid.clone(), q.branch_id.clone(), bucket.clone(), table.clone());
    let _guard = state.locks.acquire(&key, state.lock_timeout()).await?;
    if let Some(bid) = &q.branch_id {
        crate::branch::ensure_table_in_branch(&state.db, &state.paths, &pid, bid, &bucket, &table).await?;
    }

    let path = state.paths.table_file(&pid, q.branch_id.as_deref(), &bucket, &table)?;
    let table_info = engine::get_table_info(&path)?;
    let format = match req.format {
        ImportFormatRequest::Csv { delimiter, quote, escape, header } => ImportFormat::Csv { delimiter, quote, escape, header },
        ImportFormatRequest::Parquet => ImportFormat::Parquet,
    };
    let dedup_mode = match req.dedup_mode {
        DedupModeRequest::AppendOnly => DedupMode::AppendOnly,
        DedupModeRequest::UpdateDuplicates => DedupMode::UpdateDuplicates,
    };
    let options = ImportOptions { incremental: req.incremental, dedup_mode };
    let credentials = req.credentials.map(|c| RemoteCredentials {
        access_key_id: c.access_key_id,
        secret_access_key: c.secret_access_key,
        region: c.region,
        endpoint: c.endpoint,
    });

    let stats = engine::import_from_file(&path, &req.source_path, &format, &options, &table_info.primary_key, credentials.as_ref())?;
    bucket_db::update_table_stats(
        &state.db,
        &pid,
        q.branch_id.as_deref(),
        &bucket,
        &table,
        stats.total_rows as i64,
        stats.size_bytes as i64,
    )
    .await?;
    Ok(ApiResponse::success(stats))
}

#[derive(Debug, Deserialize)]
struct ExportRequest {
    dest_path: String,
    #[serde(default = "default_export_format")]
    format: ExportFormatRequest,
    columns: Option<Vec<String>>,
    where_clause: Option<String>,
    compression: Option<String>,
}

fn default_export_format() -> ExportFormatRequest {
    ExportFormatRequest::Csv
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(clippy::enum_variant_names)]
enum ExportFormatRequest {
    Csv,
    Parquet,
}

async fn export_table(
    State(state): State<AppState>,
    Path((pid, bucket, table)): Path<(String, String, String)>,
    Query(q): Query<BranchQuery>,
    headers: HeaderMap,
    Json(req): Json<ExportRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_read(&state, &headers, &pid).await?;
    let path = resolved_path(&state, &pid, q.branch_id.as_deref(), &bucket, &table).await?;
    let format = match req.format {
        ExportFormatRequest::Csv => ExportFormat::Csv,
        ExportFormatRequest::Parquet => ExportFormat::Parquet,
    };
    let options = ExportOptions { columns: req.columns, where_clause: req.where_clause, compression: req.compression };
    let stats = engine::export_to_file(&path, &req.dest_path, format, &options)?;
    Ok(ApiResponse::success(stats))
}
