//! Authorization and identity core (component E).
//!
//! Keys are opaque strings. The admin key is a process-wide secret that is
//! never stored; every other key is recorded in the metadata store as a
//! salted hash plus a short, non-secret prefix used for O(1) lookup. All
//! comparisons that touch secret material run through [`subtle`] so
//! timing does not leak which byte first differed.

pub mod presign;
pub mod sigv4;

use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use sqlx::PgPool;
use subtle::ConstantTimeEq;

use crate::error::AppError;
use crate::metadata::{api_keys, models::ApiKeyRow};

/// Number of leading characters of a plaintext key that are stored
/// unsalted as `key_prefix`, purely as a lookup index. Must be long
/// enough that collisions are rare but short enough to leak nothing
/// useful about the secret (the hash is still required to verify).
pub const KEY_PREFIX_LEN: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    ProjectAdmin,
    BranchAdmin,
    BranchRead,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::ProjectAdmin => "project_admin",
            Scope::BranchAdmin => "branch_admin",
            Scope::BranchRead => "branch_read",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "project_admin" => Some(Scope::ProjectAdmin),
            "branch_admin" => Some(Scope::BranchAdmin),
            "branch_read" => Some(Scope::BranchRead),
            _ => None,
        }
    }
}

/// The resolved identity behind a validated key.
#[derive(Debug, Clone)]
pub enum Identity {
    Admin,
    Project {
        api_key_id: uuid::Uuid,
        project_id: String,
        branch_id: Option<String>,
        scope: Scope,
    },
}

pub fn key_prefix(key: &str) -> String {
    key.chars().take(KEY_PREFIX_LEN).collect()
}

/// Salt-and-stretch hash of a plaintext key. Never compare hashes with
/// `==` — use [`verify_key_hash`].
pub fn hash_key(key: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(key.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| AppError::Internal(format!("failed to hash key: {e}")))
}

/// Constant-time verification of `key` against a previously hashed value.
pub fn verify_key_hash(key: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(key.as_bytes(), &parsed)
        .is_ok()
}

/// Constant-time string comparison for secrets that are NOT password
/// hashes (the admin secret, pre-signed URL signatures, SigV4 digests).
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// `verify_admin` — true iff `key` equals the process-wide admin secret.
pub fn verify_admin(key: &str, admin_secret: &str) -> bool {
    !admin_secret.is_empty() && constant_time_eq(key, admin_secret)
}

async fn lookup_live_key(pool: &PgPool, key: &str) -> Result<ApiKeyRow, AppError> {
    let prefix = key_prefix(key);
    let record = api_keys::get_api_key_by_prefix(pool, &prefix)
        .await
        .map_err(|_| AppError::Auth("invalid credential".into()))?;

    if !verify_key_hash(key, &record.key_hash) {
        return Err(AppError::Auth("invalid credential".into()));
    }
    if record.revoked {
        return Err(AppError::Auth("credential has been revoked".into()));
    }
    if let Some(expires_at) = record.expires_at {
        if expires_at < chrono::Utc::now() {
            return Err(AppError::Auth("credential has expired".into()));
        }
    }

    // Best-effort; a failure here must never fail the auth decision itself.
    if let Err(e) = api_keys::update_api_key_last_used(pool, record.id).await {
        tracing::warn!(error = %e, api_key_id = %record.id, "failed to record last_used_at for api key");
    }

    Ok(record)
}

/// `authorize_project(k, pid)`.
pub async fn authorize_project(
    pool: &PgPool,
    admin_secret: &str,
    key: &str,
    project_id: &str,
) -> Result<Identity, AppError> {
    if verify_admin(key, admin_secret) {
        return Ok(Identity::Admin);
    }

    let record = lookup_live_key(pool, key).await?;
    if record.project_id.as_deref() != Some(project_id) {
        return Err(AppError::Authorization(
            "credential does not belong to this project".into(),
        ));
    }

    let scope = Scope::parse(&record.scope)
        .ok_or_else(|| AppError::Internal(format!("unknown api key scope '{}'", record.scope)))?;

    Ok(Identity::Project {
        api_key_id: record.id,
        project_id: record.project_id.unwrap_or_default(),
        branch_id: record.branch_id,
        scope,
    })
}

/// `authorize_branch(k, pid, bid)`.
pub async fn authorize_branch(
    pool: &PgPool,
    admin_secret: &str,
    key: &str,
    project_id: &str,
    branch_id: &str,
) -> Result<Identity, AppError> {
    if verify_admin(key, admin_secret) {
        return Ok(Identity::Admin);
    }

    let record = lookup_live_key(pool, key).await?;
    if record.project_id.as_deref() != Some(project_id) {
        return Err(AppError::Authorization(
            "credential does not belong to this project".into(),
        ));
    }

    let scope = Scope::parse(&record.scope)
        .ok_or_else(|| AppError::Internal(format!("unknown api key scope '{}'", record.scope)))?;

    match scope {
        Scope::ProjectAdmin => {},
        Scope::BranchAdmin | Scope::BranchRead => {
            if record.branch_id.as_deref() != Some(branch_id) {
                return Err(AppError::Authorization(
                    "credential is scoped to a different branch".into(),
                ));
            }
        },
    }

    Ok(Identity::Project {
        api_key_id: record.id,
        project_id: record.project_id.unwrap_or_default(),
        branch_id: record.branch_id,
        scope,
    })
}

/// `authorize_driver(k)` — any live key (admin or project). The command
/// handler re-checks the scope against the command body's project id.
pub async fn authorize_driver(pool: &PgPool, admin_secret: &str, key: &str) -> Result<Identity, AppError> {
    if verify_admin(key, admin_secret) {
        return Ok(Identity::Admin);
    }
    let record = lookup_live_key(pool, key).await?;
    let scope = Scope::parse(&record.scope)
        .ok_or_else(|| AppError::Internal(format!("unknown api key scope '{}'", record.scope)))?;
    Ok(Identity::Project {
        api_key_id: record.id,
        project_id: record.project_id.unwrap_or_default(),
        branch_id: record.branch_id,
        scope,
    })
}

/// Write access requires project_admin, or branch_admin bound to the
/// specific branch being written.
pub fn can_write_branch(identity: &Identity, branch_id: Option<&str>) -> bool {
    match identity {
        Identity::Admin => true,
        Identity::Project { scope, branch_id: bound, .. } => match scope {
            Scope::ProjectAdmin => true,
            Scope::BranchAdmin => bound.as_deref() == branch_id,
            Scope::BranchRead => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_roundtrip() {
        let hash = hash_key("sk_live_abcdef123456").unwrap();
        assert!(verify_key_hash("sk_live_abcdef123456", &hash));
        assert!(!verify_key_hash("sk_live_wrongkey", &hash));
    }

    #[test]
    fn prefix_is_stable_length() {
        assert_eq!(key_prefix("sk_live_abcdef123456").len(), KEY_PREFIX_LEN);
        assert_eq!(key_prefix("short"), "short");
    }

    #[test]
    fn admin_verification_is_exact() {
        assert!(verify_admin("s3cr3t", "s3cr3t"));
        assert!(!verify_admin("s3cr3t2", "s3cr3t"));
        assert!(!verify_admin("s3cr3t", ""));
    }
}
