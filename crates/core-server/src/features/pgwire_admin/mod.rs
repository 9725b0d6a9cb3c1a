//! Internal endpoints backing the PG-wire session engine (component J).
//! These are not part of the tenant-facing REST surface — only the
//! PG-wire listener itself calls them, over loopback, with the admin
//! credential — so authentication is a flat admin check rather than
//! per-project authorization.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::response::{ApiResponse, ApiResult};
use crate::error::AppError;
use crate::features::shared::auth_extract;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/pgwire/auth", axum::routing::post(authenticate))
        .route("/pgwire/sessions", axum::routing::get(list_sessions).post(open_session))
        .route("/pgwire/sessions/:sid", axum::routing::get(get_session))
        .route("/pgwire/sessions/:sid/activity", axum::routing::patch(touch_session))
        .route("/pgwire/sessions/cleanup", axum::routing::post(cleanup))
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let key = auth_extract::credential(headers)?;
    if crate::auth::verify_admin(&key, &state.config.storage_core.admin_secret) {
        return Ok(());
    }
    Err(AppError::Authorization("internal pgwire endpoints require the admin credential".into()))
}

#[derive(Debug, Deserialize)]
struct AuthRequest {
    username: String,
    password: String,
}

/// Verifies workspace credentials and eligibility, but does not itself
/// open the session row — the caller does that once it has actually
/// attached the workspace's tables, via `POST /pgwire/sessions`.
async fn authenticate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AuthRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    require_admin(&state, &headers)?;

    let creds = crate::metadata::workspaces::get_workspace_credentials_by_username(&state.db, &req.username)
        .await
        .map_err(|_| AppError::Auth("invalid credentials".into()))?;
    let status = crate::workspace::get(&state.db, &creds.workspace_id).await?;

    if status.effective_status != "active" {
        return Err(AppError::Auth(format!("workspace {}", status.effective_status)));
    }
    if !crate::auth::constant_time_eq(&crate::workspace::hash_password(&req.password), &creds.password_hash) {
        return Err(AppError::Auth("invalid credentials".into()));
    }

    let active = crate::metadata::workspaces::count_active_pgwire_sessions(&state.db, &creds.workspace_id).await?;
    if active >= state.config.storage_core.pgwire_max_sessions_per_workspace {
        return Err(AppError::RateLimit("too many connections".into()));
    }

    Ok(ApiResponse::success(status.workspace))
}

#[derive(Debug, Deserialize)]
struct OpenSessionRequest {
    workspace_id: String,
    client_ip: String,
}

async fn open_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<OpenSessionRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    require_admin(&state, &headers)?;
    let row = crate::metadata::workspaces::create_pgwire_session(&state.db, &req.workspace_id, &req.client_ip).await?;
    Ok(ApiResponse::success(row))
}

#[derive(Debug, Deserialize)]
struct ListSessionsQuery {
    workspace_id: String,
}

async fn list_sessions(
    State(state): State<AppState>,
    Query(q): Query<ListSessionsQuery>,
    headers: HeaderMap,
) -> ApiResult<impl axum::response::IntoResponse> {
    require_admin(&state, &headers)?;
    let rows = crate::metadata::workspaces::list_pgwire_sessions(&state.db, &q.workspace_id).await?;
    Ok(ApiResponse::success(rows))
}

async fn get_session(State(state): State<AppState>, Path(sid): Path<Uuid>, headers: HeaderMap) -> ApiResult<impl axum::response::IntoResponse> {
    require_admin(&state, &headers)?;
    let row = crate::metadata::workspaces::get_pgwire_session(&state.db, sid).await?;
    Ok(ApiResponse::success(row))
}

async fn touch_session(State(state): State<AppState>, Path(sid): Path<Uuid>, headers: HeaderMap) -> ApiResult<impl axum::response::IntoResponse> {
    require_admin(&state, &headers)?;
    crate::metadata::workspaces::touch_pgwire_session(&state.db, sid).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn cleanup(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<impl axum::response::IntoResponse> {
    require_admin(&state, &headers)?;
    let idle = crate::metadata::workspaces::cleanup_idle_sessions(&state.db, state.config.storage_core.pgwire_idle_timeout_secs).await?;
    Ok(ApiResponse::success(idle))
}
