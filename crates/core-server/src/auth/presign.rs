//! Pre-signed URL signing and verification for the S3 surface's
//! `GET /projects/{pid}/buckets/{bucket}/tables/{table}/presign`
//! endpoint: a bearer-free, time-boxed link to a single object.
//!
//! Signature binds method + bucket + key + expiry so a signed GET
//! cannot be replayed as a DELETE, and a link for one object cannot be
//! edited to point at another.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::auth::constant_time_eq;
use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

fn string_to_sign(method: &str, bucket: &str, key: &str, expires_at: i64) -> String {
    format!("{method}\n{bucket}\n{key}\n{expires_at}")
}

/// Produces the `signature` query parameter for a pre-signed URL.
pub fn sign(secret: &str, method: &str, bucket: &str, key: &str, expires_at: i64) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes()).expect("hmac accepts keys of any length");
    mac.update(string_to_sign(method, bucket, key, expires_at).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a presented `(method, bucket, key, expires_at, signature)`
/// tuple: checks expiry first (cheap, no secret needed) then the HMAC
/// in constant time.
pub fn verify(
    secret: &str,
    method: &str,
    bucket: &str,
    key: &str,
    expires_at: i64,
    signature: &str,
    now: i64,
) -> Result<(), AppError> {
    if now > expires_at {
        return Err(AppError::Gone("pre-signed URL has expired".into()));
    }
    let expected = sign(secret, method, bucket, key, expires_at);
    if constant_time_eq(&expected, signature) {
        Ok(())
    } else {
        Err(AppError::Auth("pre-signed URL signature is invalid".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_verifies() {
        let sig = sign("secret", "GET", "mybucket", "a/b.csv", 2_000_000_000);
        assert!(verify("secret", "GET", "mybucket", "a/b.csv", 2_000_000_000, &sig, 1_900_000_000).is_ok());
    }

    #[test]
    fn expired_link_is_gone_even_with_valid_signature() {
        let sig = sign("secret", "GET", "mybucket", "a/b.csv", 100);
        let err = verify("secret", "GET", "mybucket", "a/b.csv", 100, &sig, 200).unwrap_err();
        assert!(matches!(err, AppError::Gone(_)));
    }

    #[test]
    fn tampered_method_is_rejected() {
        let sig = sign("secret", "GET", "mybucket", "a/b.csv", 2_000_000_000);
        let err = verify("secret", "DELETE", "mybucket", "a/b.csv", 2_000_000_000, &sig, 0).unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }

    #[test]
    fn tampered_key_is_rejected() {
        let sig = sign("secret", "GET", "mybucket", "a/b.csv", 2_000_000_000);
        let err = verify("secret", "GET", "mybucket", "a/other.csv", 2_000_000_000, &sig, 0).unwrap_err();
        assert!(matches!(err, AppError::Auth(_)));
    }
}
