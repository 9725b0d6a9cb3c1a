//! Operations log: an append-only audit trail of control-plane actions.
//!
//! Logging an operation never fails the caller's request: a write error
//! here is logged and swallowed, matching the teacher's audit middleware
//! philosophy of "observability must not become a new failure mode."

use chrono::Utc;
use sqlx::PgPool;

use crate::db::DbResult;

use super::models::OperationLogRow;

#[derive(Debug, Clone, Default)]
pub struct LogOperationParams<'a> {
    pub operation: &'a str,
    pub status: &'a str,
    pub project_id: Option<&'a str>,
    pub resource_type: Option<&'a str>,
    pub resource_id: Option<&'a str>,
    pub request_id: Option<&'a str>,
    pub duration_ms: Option<i64>,
    pub error_message: Option<&'a str>,
    pub details: Option<serde_json::Value>,
}

/// Records one entry. Never returns an error to the caller; failures are
/// logged via `tracing` instead so a broken audit sink cannot take down
/// the control plane.
pub async fn log_operation(pool: &PgPool, params: LogOperationParams<'_>) {
    let result = sqlx::query(
        r#"
        INSERT INTO operations_log (operation, status, project_id, resource_type, resource_id, request_id, duration_ms, error_message, details, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(params.operation)
    .bind(params.status)
    .bind(params.project_id)
    .bind(params.resource_type)
    .bind(params.resource_id)
    .bind(params.request_id)
    .bind(params.duration_ms)
    .bind(params.error_message)
    .bind(params.details)
    .bind(Utc::now())
    .execute(pool)
    .await;

    if let Err(err) = result {
        tracing::error!(error = %err, operation = params.operation, "failed to write operations_log entry");
    }
}

pub async fn list_operations(
    pool: &PgPool,
    project_id: Option<&str>,
    limit: i64,
    offset: i64,
) -> DbResult<Vec<OperationLogRow>> {
    let rows = sqlx::query_as::<_, OperationLogRow>(
        r#"
        SELECT id, operation, status, project_id, resource_type, resource_id, request_id, duration_ms, error_message, details, created_at
        FROM operations_log
        WHERE $1::text IS NULL OR project_id = $1
        ORDER BY created_at DESC
        LIMIT $2 OFFSET $3
        "#,
    )
    .bind(project_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
