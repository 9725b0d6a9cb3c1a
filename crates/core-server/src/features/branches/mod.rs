//! Dev branch routes: create/list/inspect/delete a branch, and pull a
//! branch-copied table back to reading through to main.

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
use crate::locks::TableKey;
use crate::metadata::projects as project_db;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:pid/branches", get(list).post(create))
        .route("/:pid/branches/:bid", get(get_one).delete(delete_one))
        .route("/:pid/branches/:bid/tables/:bucket/:table/pull", axum::routing::post(pull))
}

async fn authorize_project_admin(state: &AppState, headers: &HeaderMap, pid: &str) -> Result<(), AppError> {
    let key = auth_extract::credential(headers)?;
    let identity = crate::auth::authorize_project(&state.db, &state.config.storage_core.admin_secret, &key, pid).await?;
    match identity {
        crate::auth::Identity::Admin => Ok(()),
        crate::auth::Identity::Project { scope: crate::auth::Scope::ProjectAdmin, .. } => Ok(()),
        _ => Err(AppError::Authorization("branch management requires a project_admin credential".into())),
    }
}

#[derive(Debug, Deserialize)]
struct CreateBranchRequest {
    name: String,
    description: Option<String>,
}

async fn create(
    State(state): State<AppState>,
    Path(pid): Path<String>,
    headers: HeaderMap,
    Json(req): Json<CreateBranchRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_project_admin(&state, &headers, &pid).await?;
    project_db::get_project(&state.db, &pid).await?;
    let branch_id = uuid::Uuid::new_v4().to_string();
    let row = project_db::create_branch(&state.db, &branch_id, &pid, &req.name, req.description.as_deref()).await?;
    Ok(ApiResponse::success(row))
}

async fn list(State(state): State<AppState>, Path(pid): Path<String>, headers: HeaderMap) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_project_admin(&state, &headers, &pid).await?;
    let rows = project_db::list_branches(&state.db, &pid).await?;
    Ok(ApiResponse::success(rows))
}

async fn get_one(
    State(state): State<AppState>,
    Path((pid, bid)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_project_admin(&state, &headers, &pid).await?;
    let row = project_db::get_branch(&state.db, &bid).await?;
    let stats = crate::branch::branch_stats(&state.paths, &pid, &bid)?;
    Ok(ApiResponse::success(json!({ "branch": row, "stats": stats })))
}

async fn delete_one(
    State(state): State<AppState>,
    Path((pid, bid)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_project_admin(&state, &headers, &pid).await?;
    crate::branch::delete_branch(&state.db, &state.paths, &pid, &bid).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn pull(
    State(state): State<AppState>,
    Path((pid, bid, bucket, table)): Path<(String, String, String, String)>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_project_admin(&state, &headers, &pid).await?;
    let key = TableKey::new(pid.clone(), Some(bid.clone()), bucket.clone(), table.clone());
    let _guard = state.locks.acquire(&key, state.lock_timeout()).await?;
    let pulled = crate::branch::pull(&state.db, &state.paths, &pid, &bid, &bucket, &table).await?;
    Ok(ApiResponse::success(json!({ "pulled": pulled })))
}
