//! Project lifecycle routes: the top of the project/branch/bucket/table
//! hierarchy. Only the admin secret can create or delete a project —
//! every other surface authenticates against a project-scoped API key.

use axum::{
    extract::{Path, State},
    http::HeaderMap,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::api::response::{ApiResponse, ApiResult};
use crate::error::AppError;
use crate::features::shared::auth_extract;
use crate::metadata::projects;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list).post(create))
        .route("/:pid", get(get_one).delete(delete_one))
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let key = auth_extract::credential(headers)?;
    if crate::auth::verify_admin(&key, &state.config.storage_core.admin_secret) {
        return Ok(());
    }
    Err(AppError::Authorization("only the admin credential may manage projects".into()))
}

#[derive(Debug, Deserialize)]
struct CreateProjectRequest {
    id: String,
    display_name: String,
}

async fn create(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<CreateProjectRequest>) -> ApiResult<impl axum::response::IntoResponse> {
    require_admin(&state, &headers)?;
    crate::features::shared::validation::validate_slug(&req.id, 64).map_err(|e| AppError::Validation(e.to_string()))?;
    crate::features::shared::validation::validate_name(&req.display_name, 256).map_err(|e| AppError::Validation(e.to_string()))?;

    let row = projects::create_project(&state.db, &req.id, &req.display_name).await?;
    Ok(ApiResponse::success(row))
}

async fn list(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<impl axum::response::IntoResponse> {
    require_admin(&state, &headers)?;
    let rows = projects::list_projects(&state.db).await?;
    Ok(ApiResponse::success(rows))
}

async fn get_one(State(state): State<AppState>, Path(pid): Path<String>, headers: HeaderMap) -> ApiResult<impl axum::response::IntoResponse> {
    crate::auth::authorize_project(&state.db, &state.config.storage_core.admin_secret, &auth_extract::credential(&headers)?, &pid).await?;
    let row = projects::get_project(&state.db, &pid).await?;
    Ok(ApiResponse::success(row))
}

async fn delete_one(State(state): State<AppState>, Path(pid): Path<String>, headers: HeaderMap) -> ApiResult<impl axum::response::IntoResponse> {
    require_admin(&state, &headers)?;
    projects::soft_delete_project(&state.db, &pid).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
