//! Driver bridge: a JSON-over-HTTP envelope used by client drivers that
//! would rather send one packed command than learn the whole REST
//! surface. `dispatch` maps a tagged `Command` to the same engine and
//! metadata calls the REST routes use, and encodes the result back
//! into the inverse envelope shape.
//!
//! Field names inside a command body are accepted in either
//! `snake_case` or `camelCase` — `#[serde(alias = "...")]` covers the
//! snake_case spelling next to the canonical camelCase one so existing
//! driver payloads don't need to be rewritten.

use axum::{extract::State, http::HeaderMap, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::response::ApiResult;
use crate::auth::{Identity, Scope};
use crate::error::AppError;
use crate::features::shared::auth_extract;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", axum::routing::post(handle))
}

#[derive(Debug, Deserialize)]
struct CommandEnvelope {
    command: Command,
    #[allow(dead_code)]
    #[serde(default)]
    credentials: Option<Value>,
    #[allow(dead_code)]
    #[serde(default)]
    features: Option<Vec<String>>,
    #[allow(dead_code)]
    #[serde(default)]
    #[serde(rename = "runtimeOptions", alias = "runtime_options")]
    runtime_options: Option<Value>,
}

#[derive(Debug, Serialize)]
struct ResponseEnvelope {
    #[serde(skip_serializing_if = "Option::is_none", rename = "commandResponse")]
    command_response: Option<Value>,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    level: MessageLevel,
    message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
enum MessageLevel {
    Error,
    Info,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum Command {
    CreateProjectCommand {
        id: String,
        #[serde(rename = "displayName", alias = "display_name")]
        display_name: String,
    },
    CreateBranchCommand {
        #[serde(rename = "projectId", alias = "project_id")]
        project_id: String,
        name: String,
        description: Option<String>,
    },
    CreateBucketCommand {
        #[serde(rename = "projectId", alias = "project_id")]
        project_id: String,
        #[serde(rename = "branchId", alias = "branch_id")]
        branch_id: Option<String>,
        name: String,
    },
    CreateTableCommand {
        #[serde(rename = "projectId", alias = "project_id")]
        project_id: String,
        #[serde(rename = "branchId", alias = "branch_id")]
        branch_id: Option<String>,
        bucket: String,
        table: String,
        columns: Vec<crate::metadata::models::ColumnDef>,
        #[serde(rename = "primaryKey", alias = "primary_key", default)]
        primary_key: Vec<String>,
    },
    PreviewTableCommand {
        #[serde(rename = "projectId", alias = "project_id")]
        project_id: String,
        #[serde(rename = "branchId", alias = "branch_id")]
        branch_id: Option<String>,
        bucket: String,
        table: String,
        #[serde(default = "default_preview_limit")]
        limit: i64,
    },
    CreateWorkspaceCommand {
        #[serde(rename = "projectId", alias = "project_id")]
        project_id: String,
        #[serde(rename = "branchId", alias = "branch_id")]
        branch_id: Option<String>,
        name: String,
        #[serde(rename = "ttlHours", alias = "ttl_hours")]
        ttl_hours: Option<i64>,
    },
    CreateSnapshotCommand {
        #[serde(rename = "projectId", alias = "project_id")]
        project_id: String,
        #[serde(rename = "branchId", alias = "branch_id")]
        branch_id: Option<String>,
        bucket: String,
        table: String,
        description: Option<String>,
    },
}

fn default_preview_limit() -> i64 {
    100
}

impl Command {
    fn project_id(&self) -> &str {
        match self {
            Command::CreateProjectCommand { id, .. } => id,
            Command::CreateBranchCommand { project_id, .. } => project_id,
            Command::CreateBucketCommand { project_id, .. } => project_id,
            Command::CreateTableCommand { project_id, .. } => project_id,
            Command::PreviewTableCommand { project_id, .. } => project_id,
            Command::CreateWorkspaceCommand { project_id, .. } => project_id,
            Command::CreateSnapshotCommand { project_id, .. } => project_id,
        }
    }

    fn is_admin_only(&self) -> bool {
        matches!(self, Command::CreateProjectCommand { .. })
    }
}

async fn authorize(state: &AppState, headers: &HeaderMap, command: &Command) -> Result<(), AppError> {
    let key = auth_extract::credential(headers)?;
    let identity = crate::auth::authorize_driver(&state.db, &state.config.storage_core.admin_secret, &key).await?;
    if command.is_admin_only() {
        return match identity {
            Identity::Admin => Ok(()),
            _ => Err(AppError::Authorization("this command requires the admin credential".into())),
        };
    }
    match identity {
        Identity::Admin => Ok(()),
        Identity::Project { project_id, scope, .. } => {
            if project_id != command.project_id() {
                return Err(AppError::Authorization("credential does not match the command's project".into()));
            }
            match scope {
                Scope::ProjectAdmin | Scope::BranchAdmin | Scope::BranchRead => Ok(()),
            }
        }
    }
}

async fn dispatch(state: &AppState, command: Command) -> Result<Value, AppError> {
    match command {
        Command::CreateProjectCommand { id, display_name } => {
            let row = crate::metadata::projects::create_project(&state.db, &id, &display_name).await?;
            Ok(serde_json::to_value(row).map_err(|e| AppError::Internal(e.to_string()))?)
        }
        Command::CreateBranchCommand { project_id, name, description } => {
            let branch_id = uuid::Uuid::new_v4().to_string();
            let row = crate::metadata::projects::create_branch(&state.db, &branch_id, &project_id, &name, description.as_deref()).await?;
            Ok(serde_json::to_value(row).map_err(|e| AppError::Internal(e.to_string()))?)
        }
        Command::CreateBucketCommand { project_id, branch_id, name } => {
            let row = crate::metadata::buckets::create_bucket(&state.db, &project_id, branch_id.as_deref(), &name).await?;
            Ok(serde_json::to_value(row).map_err(|e| AppError::Internal(e.to_string()))?)
        }
        Command::CreateTableCommand { project_id, branch_id, bucket, table, columns, primary_key } => {
            let key = crate::locks::TableKey::new(project_id.clone(), branch_id.clone(), bucket.clone(), table.clone());
            let _guard = state.locks.acquire(&key, state.lock_timeout()).await?;
            let path = state.paths.table_file(&project_id, branch_id.as_deref(), &bucket, &table)?;
            crate::engine::create_table(&path, &columns, &primary_key)?;
            let row = crate::metadata::buckets::create_table(
                &state.db,
                &project_id,
                branch_id.as_deref(),
                &bucket,
                &table,
                serde_json::to_value(&columns).map_err(|e| AppError::Internal(e.to_string()))?,
                serde_json::to_value(&primary_key).map_err(|e| AppError::Internal(e.to_string()))?,
            )
            .await?;
            Ok(serde_json::to_value(row).map_err(|e| AppError::Internal(e.to_string()))?)
        }
        Command::PreviewTableCommand { project_id, branch_id, bucket, table, limit } => {
            let path = crate::branch::resolve_read_path(&state.db, &state.paths, &project_id, branch_id.as_deref(), &bucket, &table).await?;
            let preview = crate::engine::preview(&path, limit)?;
            Ok(serde_json::to_value(preview).map_err(|e| AppError::Internal(e.to_string()))?)
        }
        Command::CreateWorkspaceCommand { project_id, branch_id, name, ttl_hours } => {
            let new_workspace = crate::workspace::create(
                &state.db,
                &state.paths,
                &project_id,
                branch_id.as_deref(),
                &name,
                ttl_hours,
                1_073_741_824,
            )
            .await?;
            Ok(serde_json::json!({ "workspace": new_workspace.workspace, "password": new_workspace.password }))
        }
        Command::CreateSnapshotCommand { project_id, branch_id, bucket, table, description } => {
            let row = crate::snapshot::capture_manual_with_lock(
                &state.db,
                &state.paths,
                &state.locks,
                state.lock_timeout(),
                &project_id,
                branch_id.as_deref(),
                &bucket,
                &table,
                description.as_deref(),
            )
            .await?;
            Ok(serde_json::to_value(row).map_err(|e| AppError::Internal(e.to_string()))?)
        }
    }
}

async fn handle(State(state): State<AppState>, headers: HeaderMap, Json(envelope): Json<CommandEnvelope>) -> ApiResult<impl axum::response::IntoResponse> {
    authorize(&state, &headers, &envelope.command).await?;
    match dispatch(&state, envelope.command).await {
        Ok(value) => Ok(Json(ResponseEnvelope {
            command_response: Some(value),
            messages: vec![],
        })),
        Err(err) => Ok(Json(ResponseEnvelope {
            command_response: None,
            messages: vec![Message { level: MessageLevel::Error, message: err.to_string() }],
        })),
    }
}
