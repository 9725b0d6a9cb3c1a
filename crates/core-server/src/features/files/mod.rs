//! Project-scoped file upload surface: a three-stage flow (prepare,
//! upload bytes, register) sitting on top of the same flat object
//! store the S3-compatible surface writes into, under a reserved
//! bucket name so it never collides with a tenant's own S3 buckets.

use axum::{
    extract::{Multipart, Path, State},
    http::HeaderMap,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::api::response::{ApiResponse, ApiResult};
use crate::error::AppError;
use crate::features::shared::auth_extract;
use crate::metadata::files as file_db;
use crate::state::AppState;

/// Reserved bucket name for project file uploads, under the same
/// flat store the S3-compatible surface serves tenant buckets from.
const FILES_BUCKET: &str = "project-files";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:pid/files/prepare", axum::routing::post(prepare))
        .route("/:pid/files/upload/:id", axum::routing::post(upload))
        .route("/:pid/files/:id", axum::routing::get(get_one).post(register))
        .route("/:pid/files/:id/download", axum::routing::get(download))
}

async fn authorize(state: &AppState, headers: &HeaderMap, pid: &str) -> Result<(), AppError> {
    crate::auth::authorize_project(&state.db, &state.config.storage_core.admin_secret, &auth_extract::credential(headers)?, pid).await?;
    Ok(())
}

fn object_key(project_id: &str, id: Uuid) -> String {
    format!("{project_id}/{id}")
}

#[derive(Debug, Deserialize)]
struct PrepareRequest {
    filename: String,
}

async fn prepare(
    State(state): State<AppState>,
    Path(pid): Path<String>,
    headers: HeaderMap,
    Json(req): Json<PrepareRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize(&state, &headers, &pid).await?;
    let id = Uuid::new_v4();
    let key = object_key(&pid, id);
    let row = file_db::prepare(&state.db, &pid, &key, &req.filename).await?;
    Ok(ApiResponse::success(json!({ "file": row, "upload_url": format!("/projects/{pid}/files/upload/{id}") })))
}

async fn upload(
    State(state): State<AppState>,
    Path((pid, id)): Path<(String, Uuid)>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize(&state, &headers, &pid).await?;
    let row = file_db::get(&state.db, &pid, id).await?;

    let field = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?
        .ok_or_else(|| AppError::Validation("missing file part".into()))?;
    let content_type = field.content_type().map(str::to_string);
    let bytes = field.bytes().await.map_err(|e| AppError::Validation(format!("invalid multipart body: {e}")))?;

    let object_path = state.paths.s3_object_file(FILES_BUCKET, &row.object_key)?;
    crate::paths::ensure_parent_dir(&object_path)?;
    tokio::fs::write(&object_path, &bytes).await?;

    let updated = file_db::mark_uploaded(&state.db, id, content_type.as_deref(), bytes.len() as i64).await?;
    Ok(ApiResponse::success(updated))
}

async fn register(
    State(state): State<AppState>,
    Path((pid, id)): Path<(String, Uuid)>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize(&state, &headers, &pid).await?;
    let row = file_db::get(&state.db, &pid, id).await?;
    if row.status != "uploaded" {
        return Err(AppError::Conflict(format!("file '{id}' has not finished uploading")));
    }
    let registered = file_db::register(&state.db, id).await?;
    Ok(ApiResponse::success(registered))
}

async fn get_one(
    State(state): State<AppState>,
    Path((pid, id)): Path<(String, Uuid)>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize(&state, &headers, &pid).await?;
    let row = file_db::get(&state.db, &pid, id).await?;
    Ok(ApiResponse::success(row))
}

async fn download(
    State(state): State<AppState>,
    Path((pid, id)): Path<(String, Uuid)>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    authorize(&state, &headers, &pid).await?;
    let row = file_db::get(&state.db, &pid, id).await?;
    let object_path = state.paths.s3_object_file(FILES_BUCKET, &row.object_key)?;
    let bytes = tokio::fs::read(&object_path).await?;

    let content_type = row.content_type.clone().unwrap_or_else(|| "application/octet-stream".to_string());
    Ok((
        [
            (axum::http::header::CONTENT_TYPE, content_type),
            (
                axum::http::header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", row.filename.replace('"', "")),
            ),
        ],
        bytes,
    ))
}
