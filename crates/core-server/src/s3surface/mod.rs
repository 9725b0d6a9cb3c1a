//! S3-compatible object surface (part of component K): a flat-file blob
//! store fronted by the subset of the S3 API this system needs —
//! PUT/GET/HEAD/DELETE object, ListObjectsV2, and a presign endpoint.
//! Backed by plain files under `<data_root>/s3/<bucket>/<key>`, not the
//! per-table engine — these are opaque byte blobs (uploaded artifacts),
//! not tabular data.

pub mod auth;
pub mod xml;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use sha2::Digest;

use crate::state::AppState;

/// Presigned-link query parameters, checked ahead of full credential
/// auth so a shared link works without an `Authorization` header.
#[derive(Debug, Deserialize, Default)]
struct PresignedParams {
    expires: Option<i64>,
    signature: Option<String>,
}

fn canonical_query_string(raw_query: &str) -> String {
    if raw_query.is_empty() {
        return String::new();
    }
    let mut pairs: Vec<(String, String)> = raw_query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| {
            let mut it = p.splitn(2, '=');
            (it.next().unwrap_or_default().to_string(), it.next().unwrap_or_default().to_string())
        })
        .collect();
    pairs.sort();
    pairs.into_iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&")
}

fn canonical_headers_and_signed(headers: &HeaderMap, signed_headers: &[String]) -> (String, String) {
    let mut canonical = String::new();
    for name in signed_headers {
        let value = headers.get(name.as_str()).and_then(|v| v.to_str().ok()).unwrap_or("").trim();
        canonical.push_str(&format!("{}:{}\n", name.to_lowercase(), value));
    }
    (canonical, signed_headers.join(";"))
}

fn payload_hash(headers: &HeaderMap, body: &[u8]) -> String {
    if let Some("UNSIGNED-PAYLOAD") = headers.get("x-amz-content-sha256").and_then(|v| v.to_str().ok()) {
        return "UNSIGNED-PAYLOAD".to_string();
    }
    hex::encode(sha2::Sha256::digest(body))
}

/// Authenticates a request against either a presigned query-string link
/// or a full credential (bearer/API key/SigV4), in that order.
async fn authenticate(
    state: &AppState,
    method: &Method,
    bucket: &str,
    key: &str,
    path: &str,
    raw_query: &str,
    headers: &HeaderMap,
    body: &[u8],
    presigned: &PresignedParams,
) -> Result<self::auth::S3Identity, crate::error::AppError> {
    if let (Some(expires_at), Some(signature)) = (presigned.expires, presigned.signature.as_deref()) {
        crate::auth::presign::verify(
            &state.config.storage_core.admin_secret,
            method.as_str(),
            bucket,
            key,
            expires_at,
            signature,
            Utc::now().timestamp(),
        )?;
        return Ok(self::auth::S3Identity::Admin);
    }

    let amz_date = headers.get("x-amz-date").and_then(|v| v.to_str().ok()).unwrap_or_default();
    let canonical_request = if let Some(auth_header) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if auth_header.starts_with("AWS4-HMAC-SHA256") {
            let components = crate::auth::sigv4::parse_authorization_header(auth_header)?;
            let (canonical_headers, signed_headers) = canonical_headers_and_signed(headers, &components.signed_headers);
            format!(
                "{}\n{path}\n{}\n{canonical_headers}\n{signed_headers}\n{}",
                method.as_str(),
                canonical_query_string(raw_query),
                payload_hash(headers, body)
            )
        } else {
            String::new()
        }
    } else {
        String::new()
    };

    self::auth::authenticate(&state.db, &state.config.storage_core.admin_secret, headers, amz_date, &canonical_request).await
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/:bucket", get(list_objects))
        .route("/:bucket/presign", post(presign))
        .route("/:bucket/*key", get(get_object).put(put_object).head(head_object).delete(delete_object))
}

fn xml_response(status: StatusCode, body: String) -> Response {
    (status, [("content-type", "application/xml")], body).into_response()
}

fn s3_error_response(status: StatusCode, code: &str, message: &str) -> Response {
    xml_response(status, xml::S3Error::new(code, message).to_xml())
}

fn http_date(timestamp: chrono::DateTime<Utc>) -> String {
    timestamp.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

async fn put_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(presigned): Query<PresignedParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = authenticate(&state, &Method::PUT, &bucket, &key, &format!("/{bucket}/{key}"), "", &headers, &body, &presigned).await {
        return e.into_response();
    }

    if let Some(content_md5) = headers.get("content-md5").and_then(|v| v.to_str().ok()) {
        let computed = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, md5::compute(&body).0);
        if computed != content_md5 {
            return s3_error_response(StatusCode::BAD_REQUEST, "BadDigest", "The Content-MD5 you specified did not match what was received.");
        }
    }

    let path = match state.paths.s3_object_file(&bucket, &key) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    if let Err(e) = crate::paths::ensure_parent_dir(&path) {
        return crate::error::AppError::from(e).into_response();
    }
    if let Err(e) = std::fs::write(&path, &body) {
        return crate::error::AppError::from(e).into_response();
    }

    let etag = format!("{:x}", md5::compute(&body));
    (StatusCode::OK, [("etag", format!("\"{etag}\""))]).into_response()
}

async fn get_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(presigned): Query<PresignedParams>,
    headers: HeaderMap,
) -> Response {
    if let Err(e) = authenticate(&state, &Method::GET, &bucket, &key, &format!("/{bucket}/{key}"), "", &headers, b"", &presigned).await {
        return e.into_response();
    }
    let path = match state.paths.s3_object_file(&bucket, &key) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    let Ok(body) = std::fs::read(&path) else {
        return s3_error_response(StatusCode::NOT_FOUND, "NoSuchKey", "The specified key does not exist.");
    };
    let metadata = std::fs::metadata(&path).ok();
    let etag = format!("\"{:x}\"", md5::compute(&body));
    let last_modified = metadata
        .and_then(|m| m.modified().ok())
        .map(|t| http_date(t.into()))
        .unwrap_or_else(|| http_date(Utc::now()));

    (
        StatusCode::OK,
        [
            ("etag", etag),
            ("content-length", body.len().to_string()),
            ("last-modified", last_modified),
        ],
        body,
    )
        .into_response()
}

async fn head_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(presigned): Query<PresignedParams>,
    headers: HeaderMap,
) -> Response {
    if let Err(e) = authenticate(&state, &Method::HEAD, &bucket, &key, &format!("/{bucket}/{key}"), "", &headers, b"", &presigned).await {
        return e.into_response();
    }
    let path = match state.paths.s3_object_file(&bucket, &key) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    let Ok(metadata) = std::fs::metadata(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Ok(body) = std::fs::read(&path) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let etag = format!("\"{:x}\"", md5::compute(&body));
    let last_modified = metadata.modified().ok().map(|t| http_date(t.into())).unwrap_or_else(|| http_date(Utc::now()));

    (
        StatusCode::OK,
        [("etag", etag), ("content-length", metadata.len().to_string()), ("last-modified", last_modified)],
    )
        .into_response()
}

/// Idempotent: deleting an absent key still returns 204.
async fn delete_object(
    State(state): State<AppState>,
    Path((bucket, key)): Path<(String, String)>,
    Query(presigned): Query<PresignedParams>,
    headers: HeaderMap,
) -> Response {
    if let Err(e) = authenticate(&state, &Method::DELETE, &bucket, &key, &format!("/{bucket}/{key}"), "", &headers, b"", &presigned).await {
        return e.into_response();
    }
    let path = match state.paths.s3_object_file(&bucket, &key) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    match std::fs::remove_file(&path) {
        Ok(_) => {},
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
        Err(e) => return crate::error::AppError::from(e).into_response(),
    }
    StatusCode::NO_CONTENT.into_response()
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(rename = "list-type")]
    #[allow(dead_code)]
    list_type: Option<String>,
    prefix: Option<String>,
    delimiter: Option<String>,
    #[serde(rename = "max-keys")]
    max_keys: Option<usize>,
}

async fn list_objects(
    State(state): State<AppState>,
    Path(bucket): Path<String>,
    Query(query): Query<ListQuery>,
    headers: HeaderMap,
) -> Response {
    if let Err(e) = authenticate(&state, &Method::GET, &bucket, "", &format!("/{bucket}"), "", &headers, b"", &PresignedParams::default()).await {
        return e.into_response();
    }
    let dir = match state.paths.s3_bucket_dir(&bucket) {
        Ok(p) => p,
        Err(e) => return e.into_response(),
    };
    let prefix = query.prefix.clone().unwrap_or_default();
    let max_keys = query.max_keys.unwrap_or(1000).min(1000);

    let mut all_keys = Vec::new();
    if dir.exists() {
        collect_keys(&dir, &dir, &mut all_keys);
    }
    all_keys.sort();

    let matching: Vec<&String> = all_keys.iter().filter(|k| k.starts_with(&prefix)).collect();

    let mut contents = Vec::new();
    let mut common_prefixes = std::collections::BTreeSet::new();
    for key in &matching {
        if let Some(delim) = &query.delimiter {
            let rest = &key[prefix.len()..];
            if let Some(pos) = rest.find(delim.as_str()) {
                common_prefixes.insert(format!("{}{}", prefix, &rest[..=pos]));
                continue;
            }
        }
        let path = dir.join(key);
        let Ok(meta) = std::fs::metadata(&path) else { continue };
        let Ok(body) = std::fs::read(&path) else { continue };
        contents.push(xml::Contents {
            key: (*key).clone(),
            last_modified: meta.modified().ok().map(|t| http_date(t.into())).unwrap_or_else(|| http_date(Utc::now())),
            etag: format!("\"{:x}\"", md5::compute(&body)),
            size: meta.len(),
        });
        if contents.len() + common_prefixes.len() >= max_keys {
            break;
        }
    }

    let is_truncated = contents.len() + common_prefixes.len() < matching.len();
    let result = xml::ListBucketResult {
        name: bucket,
        prefix,
        key_count: contents.len() + common_prefixes.len(),
        max_keys,
        is_truncated,
        contents,
        common_prefixes: common_prefixes.into_iter().map(|prefix| xml::CommonPrefix { prefix }).collect(),
    };
    xml_response(StatusCode::OK, result.to_xml())
}

fn collect_keys(root: &std::path::Path, dir: &std::path::Path, out: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_keys(root, &path, out);
        } else if let Ok(relative) = path.strip_prefix(root) {
            out.push(relative.to_string_lossy().replace('\\', "/"));
        }
    }
}

#[derive(Debug, Deserialize)]
struct PresignRequest {
    method: String,
    key: String,
    expires_in_secs: Option<i64>,
}

async fn presign(State(state): State<AppState>, Path(bucket): Path<String>, headers: HeaderMap, Json(req): Json<PresignRequest>) -> Response {
    if let Err(e) = authenticate(&state, &Method::POST, &bucket, "", &format!("/{bucket}/presign"), "", &headers, b"", &PresignedParams::default()).await {
        return e.into_response();
    }
    let ttl = req.expires_in_secs.unwrap_or(3600).max(1);
    let expires_at = Utc::now().timestamp() + ttl;
    let signature = crate::auth::presign::sign(&state.config.storage_core.admin_secret, &req.method, &bucket, &req.key, expires_at);
    let url = format!("/s3/{bucket}/{}?expires={expires_at}&signature={signature}", req.key);
    Json(json!({ "url": url, "method": req.method, "expires_at": expires_at })).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_date_has_gmt_suffix() {
        let dt = Utc::now();
        assert!(http_date(dt).ends_with("GMT"));
    }
}
