//! Hierarchical snapshot configuration (component F settings surface):
//! system -> project -> bucket -> table, narrowest scope wins per field.
//! Every GET returns both the folded effective policy and an
//! inheritance map naming which scope set each field.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::api::response::{ApiResponse, ApiResult};
use crate::error::AppError;
use crate::features::shared::auth_extract;
use crate::metadata::snapshots as snapshot_db;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/:pid/settings/snapshots",
            axum::routing::get(get_project_settings).put(put_project_settings),
        )
        .route(
            "/:pid/buckets/:bucket/settings/snapshots",
            axum::routing::get(get_bucket_settings).put(put_bucket_settings),
        )
        .route(
            "/:pid/buckets/:bucket/tables/:table/settings/snapshots",
            axum::routing::get(get_table_settings).put(put_table_settings),
        )
}

async fn authorize_project_admin(state: &AppState, headers: &HeaderMap, pid: &str) -> Result<(), AppError> {
    let key = auth_extract::credential(headers)?;
    let identity = crate::auth::authorize_project(&state.db, &state.config.storage_core.admin_secret, &key, pid).await?;
    match identity {
        crate::auth::Identity::Admin => Ok(()),
        crate::auth::Identity::Project { scope: crate::auth::Scope::ProjectAdmin, .. } => Ok(()),
        _ => Err(AppError::Authorization("snapshot settings require a project_admin credential".into())),
    }
}

#[derive(Debug, Deserialize, Default)]
struct SnapshotConfigRequest {
    enabled: Option<bool>,
    retention_manual_days: Option<i32>,
    retention_auto_days: Option<i32>,
    trigger_drop_table: Option<bool>,
    trigger_drop_column: Option<bool>,
    trigger_truncate_table: Option<bool>,
    trigger_delete_all_rows: Option<bool>,
}

async fn apply(state: &AppState, scope: &str, scope_key: &str, req: SnapshotConfigRequest) -> Result<(), AppError> {
    snapshot_db::set_snapshot_config(
        &state.db,
        scope,
        scope_key,
        req.enabled,
        req.retention_manual_days,
        req.retention_auto_days,
        req.trigger_drop_table,
        req.trigger_drop_column,
        req.trigger_truncate_table,
        req.trigger_delete_all_rows,
    )
    .await?;
    Ok(())
}

/// The resolver only folds real project/bucket/table scopes, so a
/// settings GET at project or bucket scope resolves against a
/// placeholder table name — the bucket- and project-wide fields are
/// what the caller actually wants, and `table` origins never apply.
const NO_TABLE: &str = "";

async fn get_project_settings(
    State(state): State<AppState>,
    Path(pid): Path<String>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_project_admin(&state, &headers, &pid).await?;
    let resolved = snapshot_db::resolve_snapshot_config_with_origins(&state.db, &pid, "", NO_TABLE).await?;
    Ok(ApiResponse::success(json!({ "effective": resolved.effective, "inheritance": resolved.inheritance })))
}

async fn put_project_settings(
    State(state): State<AppState>,
    Path(pid): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SnapshotConfigRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_project_admin(&state, &headers, &pid).await?;
    apply(&state, "project", &pid, req).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn get_bucket_settings(
    State(state): State<AppState>,
    Path((pid, bucket)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_project_admin(&state, &headers, &pid).await?;
    let resolved = snapshot_db::resolve_snapshot_config_with_origins(&state.db, &pid, &bucket, NO_TABLE).await?;
    Ok(ApiResponse::success(json!({ "effective": resolved.effective, "inheritance": resolved.inheritance })))
}

async fn put_bucket_settings(
    State(state): State<AppState>,
    Path((pid, bucket)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<SnapshotConfigRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_project_admin(&state, &headers, &pid).await?;
    apply(&state, "bucket", &format!("{pid}/{bucket}"), req).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn get_table_settings(
    State(state): State<AppState>,
    Path((pid, bucket, table)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_project_admin(&state, &headers, &pid).await?;
    let resolved = snapshot_db::resolve_snapshot_config_with_origins(&state.db, &pid, &bucket, &table).await?;
    Ok(ApiResponse::success(json!({ "effective": resolved.effective, "inheritance": resolved.inheritance })))
}

async fn put_table_settings(
    State(state): State<AppState>,
    Path((pid, bucket, table)): Path<(String, String, String)>,
    headers: HeaderMap,
    Json(req): Json<SnapshotConfigRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_project_admin(&state, &headers, &pid).await?;
    apply(&state, "table", &format!("{pid}/{bucket}/{table}"), req).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
