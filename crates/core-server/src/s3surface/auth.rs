//! Credential extraction and identity resolution for the S3-compatible
//! surface. Distinct from `auth::authorize_project`/`authorize_branch`
//! because S3 clients authenticate against an access-key/secret pair
//! (SigV4) rather than an opaque bearer key, though both paths bottom
//! out at the same `api_keys` identity once resolved.

use axum::http::HeaderMap;
use sqlx::PgPool;

use crate::auth::sigv4;
use crate::error::AppError;
use crate::metadata::api_keys;

#[derive(Debug, Clone)]
pub enum S3Identity {
    Admin,
    ApiKey(uuid::Uuid),
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Extracts a bearer-style credential in the documented precedence
/// order: `Authorization: Bearer`, `X-Api-Key`, `x-amz-security-token`.
/// Returns `None` if none of those are present — the caller should then
/// check for a SigV4 `Authorization` header instead.
fn extract_bearer_style(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = header_str(headers, "authorization") {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }
    if let Some(key) = header_str(headers, "x-api-key") {
        return Some(key.to_string());
    }
    if let Some(token) = header_str(headers, "x-amz-security-token") {
        return Some(token.to_string());
    }
    None
}

async fn resolve_bearer_style(pool: &PgPool, admin_secret: &str, key: &str) -> Result<S3Identity, AppError> {
    if crate::auth::verify_admin(key, admin_secret) {
        return Ok(S3Identity::Admin);
    }
    let prefix = crate::auth::key_prefix(key);
    let record = crate::metadata::api_keys::get_api_key_by_prefix(pool, &prefix)
        .await
        .map_err(|_| AppError::Auth("invalid credential".into()))?;
    if !crate::auth::verify_key_hash(key, &record.key_hash) {
        return Err(AppError::Auth("invalid credential".into()));
    }
    Ok(S3Identity::ApiKey(record.id))
}

async fn resolve_sigv4(pool: &PgPool, auth_header: &str, amz_date: &str, canonical_request: &str) -> Result<S3Identity, AppError> {
    let components = sigv4::parse_authorization_header(auth_header)?;
    let (secret, api_key_id, is_admin) = api_keys::get_s3_secret(pool, &components.access_key_id)
        .await
        .map_err(|_| AppError::Auth("unknown access key".into()))?;

    sigv4::verify_signature(&components, &secret, amz_date, canonical_request)?;

    if is_admin {
        return Ok(S3Identity::Admin);
    }
    api_key_id.map(S3Identity::ApiKey).ok_or_else(|| AppError::Auth("access key has no bound identity".into()))
}

/// Authenticates an S3-surface request. `amz_date` and
/// `canonical_request` are only needed on the SigV4 path and may be
/// computed lazily by the caller.
pub async fn authenticate(
    pool: &PgPool,
    admin_secret: &str,
    headers: &HeaderMap,
    amz_date: &str,
    canonical_request: &str,
) -> Result<S3Identity, AppError> {
    if let Some(key) = extract_bearer_style(headers) {
        return resolve_bearer_style(pool, admin_secret, &key).await;
    }
    if let Some(auth) = header_str(headers, "authorization") {
        if auth.starts_with("AWS4-HMAC-SHA256") {
            return resolve_sigv4(pool, auth, amz_date, canonical_request).await;
        }
    }
    Err(AppError::Auth("no credential presented".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_takes_precedence_over_api_key_header() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer sk_live_x"));
        headers.insert("x-api-key", HeaderValue::from_static("sk_live_y"));
        assert_eq!(extract_bearer_style(&headers), Some("sk_live_x".to_string()));
    }

    #[test]
    fn falls_back_through_api_key_to_security_token() {
        let mut headers = HeaderMap::new();
        headers.insert("x-amz-security-token", HeaderValue::from_static("tok"));
        assert_eq!(extract_bearer_style(&headers), Some("tok".to_string()));
    }

    #[test]
    fn no_recognized_header_yields_none() {
        let headers = HeaderMap::new();
        assert_eq!(extract_bearer_style(&headers), None);
    }
}
