//! Idempotency-key cache backing `Idempotency-Key` request replay.

use chrono::Utc;
use sqlx::PgPool;

use crate::db::DbResult;

pub struct CachedResponse {
    pub status_code: i32,
    pub response_body: serde_json::Value,
}

/// Looks up a previously recorded response for `(key, fingerprint)`. The
/// fingerprint binds the cached response to the exact request body, so a
/// key reused with a different payload is treated as a fresh request by
/// the caller rather than silently served stale data.
pub async fn get_cached_response(
    pool: &PgPool,
    idempotency_key: &str,
    request_fingerprint: &str,
) -> DbResult<Option<CachedResponse>> {
    let row: Option<(i32, serde_json::Value)> = sqlx::query_as(
        "SELECT status_code, response_body FROM idempotency_keys WHERE idempotency_key = $1 AND request_fingerprint = $2",
    )
    .bind(idempotency_key)
    .bind(request_fingerprint)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|(status_code, response_body)| CachedResponse {
        status_code,
        response_body,
    }))
}

pub async fn record_response(
    pool: &PgPool,
    idempotency_key: &str,
    request_fingerprint: &str,
    status_code: i32,
    response_body: &serde_json::Value,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO idempotency_keys (idempotency_key, request_fingerprint, status_code, response_body, recorded_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (idempotency_key, request_fingerprint) DO NOTHING
        "#,
    )
    .bind(idempotency_key)
    .bind(request_fingerprint)
    .bind(status_code)
    .bind(response_body)
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Purges cache rows older than `ttl_seconds`, run periodically by the
/// background job loop.
pub async fn purge_expired(pool: &PgPool, ttl_seconds: i64) -> DbResult<u64> {
    let cutoff = Utc::now() - chrono::Duration::seconds(ttl_seconds);
    let result = sqlx::query("DELETE FROM idempotency_keys WHERE recorded_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
