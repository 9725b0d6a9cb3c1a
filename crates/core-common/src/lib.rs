//! Core Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling used across the storage
//! core workspace.
//!
//! - **Error Handling**: a single `CoreError` shared by components that
//!   don't own an HTTP-facing error type of their own.
//! - **Checksums**: file integrity verification (used by table import/
//!   export and the S3 surface's `Content-MD5` verification).
//! - **Types**: small domain-neutral value types (ids, checksums).

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

pub use error::{CoreError, Result};
