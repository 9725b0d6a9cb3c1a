//! Bucket sharing and linking routes (component H). Sharing records
//! which target project may link a bucket; linking is what actually
//! attaches the source bucket's tables read-only into the target
//! project, via same-named views.

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
use crate::metadata::shares as share_db;
use crate::share;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/:pid/buckets/:bucket/share",
            axum::routing::get(list_shares).post(create_share),
        )
        .route("/:pid/buckets/:bucket/share/:target_pid", axum::routing::delete(revoke_share))
        .route("/:pid/buckets/:bucket/link", axum::routing::post(create_link).delete(delete_link))
}

async fn authorize_project_admin(state: &AppState, headers: &HeaderMap, pid: &str) -> Result<(), AppError> {
    let key = auth_extract::credential(headers)?;
    let identity = crate::auth::authorize_project(&state.db, &state.config.storage_core.admin_secret, &key, pid).await?;
    match identity {
        crate::auth::Identity::Admin => Ok(()),
        crate::auth::Identity::Project { scope: crate::auth::Scope::ProjectAdmin, .. } => Ok(()),
        _ => Err(AppError::Authorization("bucket sharing requires a project_admin credential".into())),
    }
}

#[derive(Debug, Deserialize)]
struct CreateShareRequest {
    target_project_id: String,
}

async fn create_share(
    State(state): State<AppState>,
    Path((pid, bucket)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<CreateShareRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_project_admin(&state, &headers, &pid).await?;
    let (row, role_name) = share::share(&state.db, &pid, &bucket, &req.target_project_id).await?;
    Ok(ApiResponse::success(json!({ "share": row, "role_name": role_name })))
}

async fn list_shares(
    State(state): State<AppState>,
    Path((pid, bucket)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_project_admin(&state, &headers, &pid).await?;
    let rows = share_db::list_shares_for_bucket(&state.db, &pid, &bucket).await?;
    Ok(ApiResponse::success(rows))
}

async fn revoke_share(
    State(state): State<AppState>,
    Path((pid, bucket, target_pid)): Path<(String, String, String)>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_project_admin(&state, &headers, &pid).await?;
    share_db::revoke_share(&state.db, &pid, &bucket, &target_pid).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct CreateLinkRequest {
    source_project_id: String,
    source_bucket: String,
}

/// The target project owns the new bucket name; the caller must hold
/// a project_admin credential for the target, not the source.
async fn create_link(
    State(state): State<AppState>,
    Path((pid, bucket)): Path<(String, String)>,
    headers: HeaderMap,
    Json(req): Json<CreateLinkRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_project_admin(&state, &headers, &pid).await?;
    let created = share::link(&state.db, &state.paths, &pid, &bucket, &req.source_project_id, &req.source_bucket).await?;
    Ok(ApiResponse::success(json!({ "tables": created })))
}

async fn delete_link(
    State(state): State<AppState>,
    Path((pid, bucket)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize_project_admin(&state, &headers, &pid).await?;
    share::unlink(&state.db, &state.paths, &pid, &bucket).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
