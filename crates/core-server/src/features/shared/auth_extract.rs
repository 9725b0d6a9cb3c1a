//! Credential extraction shared by every REST feature route. Mirrors
//! the precedence `s3surface::auth` uses for its own bearer-style path:
//! `Authorization: Bearer`, then `X-Api-Key`.

use axum::http::HeaderMap;

use crate::error::AppError;

pub fn credential(headers: &HeaderMap) -> Result<String, AppError> {
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        if let Some(token) = auth.strip_prefix("Bearer ") {
            return Ok(token.to_string());
        }
    }
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Ok(key.to_string());
    }
    Err(AppError::Auth("no credential presented".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn prefers_bearer_over_api_key_header() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer tok1"));
        headers.insert("x-api-key", HeaderValue::from_static("tok2"));
        assert_eq!(credential(&headers).unwrap(), "tok1");
    }

    #[test]
    fn missing_credential_is_an_auth_error() {
        let headers = HeaderMap::new();
        assert!(matches!(credential(&headers), Err(AppError::Auth(_))));
    }
}
