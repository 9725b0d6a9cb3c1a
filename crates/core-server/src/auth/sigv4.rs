//! AWS SigV4 verification for the S3-compatible surface.
//!
//! We only verify; we never sign outbound requests as a client — the
//! S3 surface here is a server implementation, not a client of an
//! upstream bucket. A request is authentic if recomputing the
//! signature with the looked-up secret over the same canonical
//! request produces an identical string, compared in constant time.

use chrono::{NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::auth::constant_time_eq;
use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// The pieces pulled out of an `Authorization: AWS4-HMAC-SHA256 ...`
/// header plus the accompanying `X-Amz-Date` header.
#[derive(Debug, Clone)]
pub struct SigV4Components {
    pub access_key_id: String,
    pub date: String,
    pub region: String,
    pub service: String,
    pub signed_headers: Vec<String>,
    pub signature: String,
}

/// Parses the `Authorization` header value. Returns `Validation` if it
/// doesn't look like a SigV4 header at all.
pub fn parse_authorization_header(value: &str) -> Result<SigV4Components, AppError> {
    let value = value
        .strip_prefix(ALGORITHM)
        .ok_or_else(|| AppError::Validation("unsupported signing algorithm".into()))?
        .trim();

    let mut credential = None;
    let mut signed_headers = None;
    let mut signature = None;

    for part in value.split(',') {
        let part = part.trim();
        if let Some(v) = part.strip_prefix("Credential=") {
            credential = Some(v.to_string());
        } else if let Some(v) = part.strip_prefix("SignedHeaders=") {
            signed_headers = Some(v.split(';').map(|s| s.to_string()).collect::<Vec<_>>());
        } else if let Some(v) = part.strip_prefix("Signature=") {
            signature = Some(v.to_string());
        }
    }

    let credential = credential.ok_or_else(|| AppError::Validation("missing Credential scope".into()))?;
    let mut scope = credential.splitn(2, '/');
    let access_key_id = scope
        .next()
        .ok_or_else(|| AppError::Validation("malformed credential scope".into()))?
        .to_string();
    let rest: Vec<&str> = scope
        .next()
        .ok_or_else(|| AppError::Validation("malformed credential scope".into()))?
        .split('/')
        .collect();
    if rest.len() != 4 || rest[3] != "aws4_request" {
        return Err(AppError::Validation("malformed credential scope".into()));
    }

    Ok(SigV4Components {
        access_key_id,
        date: rest[0].to_string(),
        region: rest[1].to_string(),
        service: rest[2].to_string(),
        signed_headers: signed_headers.ok_or_else(|| AppError::Validation("missing SignedHeaders".into()))?,
        signature: signature.ok_or_else(|| AppError::Validation("missing Signature".into()))?,
    })
}

fn hmac_sign(key: &[u8], data: &str) -> Vec<u8> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("hmac accepts keys of any length");
    mac.update(data.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

fn signing_key(secret: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sign(format!("AWS4{secret}").as_bytes(), date_stamp);
    let k_region = hmac_sign(&k_date, region);
    let k_service = hmac_sign(&k_region, service);
    hmac_sign(&k_service, "aws4_request")
}

/// Rebuilds the canonical request and string-to-sign, then checks the
/// recomputed signature against `components.signature` in constant time.
///
/// `canonical_request` must already be assembled by the caller (method,
/// canonical URI, canonical query string, canonical headers, signed
/// headers, hashed payload) since that depends on framework-specific
/// request plumbing the auth core doesn't own.
pub fn verify_signature(
    components: &SigV4Components,
    secret_access_key: &str,
    amz_date: &str,
    canonical_request: &str,
) -> Result<(), AppError> {
    let date_stamp = &components.date;
    if !amz_date.starts_with(date_stamp.as_str()) {
        return Err(AppError::Auth("X-Amz-Date does not match credential scope date".into()));
    }
    // bound the clock skew we tolerate to a single day either side
    if let Ok(parsed) = NaiveDateTime::parse_from_str(amz_date, "%Y%m%dT%H%M%SZ") {
        let now = Utc::now().naive_utc();
        let delta = (now - parsed).num_seconds().abs();
        if delta > 86_400 {
            return Err(AppError::Auth("request timestamp out of tolerance".into()));
        }
    }

    let credential_scope = format!(
        "{}/{}/{}/aws4_request",
        components.date, components.region, components.service
    );
    let hashed_canonical_request = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    let string_to_sign = format!("{ALGORITHM}\n{amz_date}\n{credential_scope}\n{hashed_canonical_request}");

    let key = signing_key(secret_access_key, date_stamp, &components.region, &components.service);
    let expected = hex::encode(hmac_sign(&key, &string_to_sign));

    if constant_time_eq(&expected, &components.signature) {
        Ok(())
    } else {
        Err(AppError::Auth("signature mismatch".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_header() {
        let header = "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20260715/us-east-1/s3/aws4_request, SignedHeaders=host;x-amz-date, Signature=abcd1234";
        let parsed = parse_authorization_header(header).unwrap();
        assert_eq!(parsed.access_key_id, "AKIDEXAMPLE");
        assert_eq!(parsed.region, "us-east-1");
        assert_eq!(parsed.service, "s3");
        assert_eq!(parsed.signed_headers, vec!["host", "x-amz-date"]);
        assert_eq!(parsed.signature, "abcd1234");
    }

    #[test]
    fn rejects_non_sigv4_header() {
        assert!(parse_authorization_header("Bearer sometoken").is_err());
    }

    #[test]
    fn signature_roundtrip_matches() {
        let components = SigV4Components {
            access_key_id: "AKIDEXAMPLE".into(),
            date: "20260715".into(),
            region: "us-east-1".into(),
            service: "s3".into(),
            signed_headers: vec!["host".into()],
            signature: String::new(),
        };
        let canonical_request = "GET\n/bucket/key\n\nhost:example.com\n\nhost\ne3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        let amz_date = "20260715T120000Z";
        let key = signing_key("secret", &components.date, &components.region, &components.service);
        let string_to_sign = {
            let scope = format!("{}/{}/{}/aws4_request", components.date, components.region, components.service);
            let hashed = hex::encode(Sha256::digest(canonical_request.as_bytes()));
            format!("{ALGORITHM}\n{amz_date}\n{scope}\n{hashed}")
        };
        let sig = hex::encode(hmac_sign(&key, &string_to_sign));
        let components = SigV4Components { signature: sig, ..components };
        assert!(verify_signature(&components, "secret", amz_date, canonical_request).is_ok());
    }
}
