//! Snapshot routes: manual capture, listing, restore, and the
//! hierarchical retention/trigger configuration (moved to
//! `features::settings`, since it is addressed by project/bucket/table
//! scope rather than by branch).

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::response::{ApiResponse, ApiResult};
use crate::error::AppError;
use crate::features::shared::auth_extract;
use crate::state::AppState;

/// Path segment used for a branch that is actually main — main has no
/// branch id of its own, so the route needs a literal stand-in.
const MAIN: &str = "main";

fn branch_id_of(bid: &str) -> Option<&str> {
    if bid == MAIN {
        None
    } else {
        Some(bid)
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:pid/branches/:bid/snapshots", get(list).post(create))
        .route("/:pid/branches/:bid/snapshots/:sid", get(get_one).delete(delete_one))
        .route("/:pid/branches/:bid/snapshots/:sid/restore", axum::routing::post(restore))
}

async fn authorize(state: &AppState, headers: &HeaderMap, pid: &str) -> Result<(), AppError> {
    crate::auth::authorize_project(&state.db, &state.config.storage_core.admin_secret, &auth_extract::credential(headers)?, pid).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct CreateSnapshotRequest {
    bucket: String,
    table: String,
    description: Option<String>,
}

async fn create(
    State(state): State<AppState>,
    Path((pid, bid)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<CreateSnapshotRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize(&state, &headers, &pid).await?;
    let row = crate::snapshot::capture_manual_with_lock(
        &state.db,
        &state.paths,
        &state.locks,
        state.lock_timeout(),
        &pid,
        branch_id_of(&bid),
        &req.bucket,
        &req.table,
        req.description.as_deref(),
    )
    .await?;
    Ok(ApiResponse::success(row))
}

#[derive(Debug, Deserialize)]
struct ListSnapshotsQuery {
    bucket: String,
    table: String,
}

async fn list(
    State(state): State<AppState>,
    Path((pid, bid)): Path<(String, String)>,
    Query(q): Query<ListSnapshotsQuery>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize(&state, &headers, &pid).await?;
    let rows = crate::metadata::snapshots::list_snapshots(&state.db, &pid, branch_id_of(&bid), &q.bucket, &q.table).await?;
    Ok(ApiResponse::success(rows))
}

async fn get_one(
    State(state): State<AppState>,
    Path((pid, _bid, sid)): Path<(String, String, Uuid)>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize(&state, &headers, &pid).await?;
    let row = crate::metadata::snapshots::get_snapshot(&state.db, sid).await?;
    Ok(ApiResponse::success(row))
}

async fn delete_one(
    State(state): State<AppState>,
    Path((pid, _bid, sid)): Path<(String, String, Uuid)>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize(&state, &headers, &pid).await?;
    let row = crate::metadata::snapshots::delete_snapshot(&state.db, sid).await?;
    let _ = std::fs::remove_file(&row.file_path);
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize, Default)]
struct RestoreRequest {
    /// Restore into a new table in the same bucket instead of overwriting
    /// the original.
    target_table: Option<String>,
}

async fn restore(
    State(state): State<AppState>,
    Path((pid, bid, sid)): Path<(String, String, Uuid)>,
    headers: HeaderMap,
    Json(req): Json<RestoreRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize(&state, &headers, &pid).await?;
    let row = crate::metadata::snapshots::get_snapshot(&state.db, sid).await?;
    let key = crate::locks::TableKey::new(pid, branch_id_of(&bid).map(str::to_string), row.bucket_name.clone(), row.table_name.clone());
    let _guard = state.locks.acquire(&key, state.lock_timeout()).await?;
    let restored = crate::snapshot::restore(&state.db, &state.paths, sid, req.target_table.as_deref()).await?;
    Ok(ApiResponse::success(restored))
}
