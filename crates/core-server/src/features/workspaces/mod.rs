//! Ephemeral SQL workspace routes: the control-plane half of component
//! I. The data-plane half (actual SQL execution) only happens over the
//! PG-wire surface — these routes only create, inspect, and manage the
//! workspace file and its credentials.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::api::response::{ApiResponse, ApiResult};
use crate::error::AppError;
use crate::features::shared::auth_extract;
use crate::state::AppState;
use crate::workspace::{self, ClearOptions, LoadTableSpec};

/// No quota is specified by the hierarchical-config surface for
/// workspaces; 1 GiB is a conservative default, overridable per create.
const DEFAULT_WORKSPACE_SIZE_LIMIT_BYTES: i64 = 1_073_741_824;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:pid/workspaces", get(list).post(create))
        .route("/:pid/workspaces/:wid", get(get_one).delete(delete_one))
        .route("/:pid/workspaces/:wid/clear", axum::routing::post(clear))
        .route("/:pid/workspaces/:wid/load", axum::routing::post(load))
        .route("/:pid/workspaces/:wid/credentials/reset", axum::routing::post(reset_credentials))
        .route("/:pid/workspaces/:wid/objects/:name", axum::routing::delete(drop_object))
}

async fn authorize(state: &AppState, headers: &HeaderMap, pid: &str) -> Result<(), AppError> {
    crate::auth::authorize_project(&state.db, &state.config.storage_core.admin_secret, &auth_extract::credential(headers)?, pid).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct CreateWorkspaceRequest {
    name: String,
    branch_id: Option<String>,
    ttl_hours: Option<i64>,
    size_limit_bytes: Option<i64>,
}

async fn create(
    State(state): State<AppState>,
    Path(pid): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CreateWorkspaceRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize(&state, &headers, &pid).await?;
    let new_workspace = workspace::create(
        &state.db,
        &state.paths,
        &pid,
        req.branch_id.as_deref(),
        &req.name,
        req.ttl_hours,
        req.size_limit_bytes.unwrap_or(DEFAULT_WORKSPACE_SIZE_LIMIT_BYTES),
    )
    .await?;
    Ok(ApiResponse::success(json!({
        "workspace": new_workspace.workspace,
        "password": new_workspace.password,
    })))
}

async fn list(State(state): State<AppState>, Path(pid): Path<String>, headers: HeaderMap) -> ApiResult<impl axum::response::IntoResponse> {
    authorize(&state, &headers, &pid).await?;
    let rows = crate::metadata::workspaces::list_workspaces(&state.db, &pid).await?;
    Ok(ApiResponse::success(rows))
}

async fn get_one(
    State(state): State<AppState>,
    Path((pid, wid)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize(&state, &headers, &pid).await?;
    let status = workspace::get(&state.db, &wid).await?;
    Ok(ApiResponse::success(status))
}

async fn delete_one(
    State(state): State<AppState>,
    Path((pid, wid)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize(&state, &headers, &pid).await?;
    workspace::delete(&state.db, &wid).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Default)]
struct ClearRequest {
    #[serde(default)]
    ignore_errors: bool,
}

async fn clear(
    State(state): State<AppState>,
    Path((pid, wid)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<ClearRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize(&state, &headers, &pid).await?;
    let dropped = workspace::clear(&state.db, &wid, &ClearOptions { ignore_errors: req.ignore_errors }).await?;
    Ok(ApiResponse::success(json!({ "dropped": dropped })))
}

#[derive(Debug, Deserialize)]
struct LoadRequest {
    branch_id: Option<String>,
    tables: Vec<LoadTableSpec>,
}

async fn load(
    State(state): State<AppState>,
    Path((pid, wid)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<LoadRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize(&state, &headers, &pid).await?;
    let results = workspace::load_tables(&state.db, &state.paths, &pid, req.branch_id.as_deref(), &wid, &req.tables).await?;
    Ok(ApiResponse::success(results))
}

async fn reset_credentials(
    State(state): State<AppState>,
    Path((pid, wid)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize(&state, &headers, &pid).await?;
    let reset = workspace::reset_credentials(&state.db, &wid).await?;
    Ok(ApiResponse::success(json!({ "password": reset.password })))
}

#[derive(Debug, Deserialize, Default)]
struct DropObjectQuery {
    #[serde(default)]
    ignore_if_not_exists: bool,
}

async fn drop_object(
    State(state): State<AppState>,
    Path((pid, wid, name)): Path<(String, String, String)>,
    axum::extract::Query(q): axum::extract::Query<DropObjectQuery>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize(&state, &headers, &pid).await?;
    workspace::drop_object(&state.db, &wid, &name, q.ignore_if_not_exists).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
