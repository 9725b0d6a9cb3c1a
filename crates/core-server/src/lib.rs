//! Storage Core Server Library
#![recursion_limit = "256"]
#![deny(clippy::unwrap_used, clippy::expect_used)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::manual_div_ceil)]
#![allow(clippy::redundant_closure)]
#![allow(clippy::manual_range_contains)]
#![allow(clippy::unnecessary_map_or)]
#![allow(clippy::useless_format)]
#![allow(clippy::should_implement_trait)]
#![allow(clippy::new_without_default)]
#![allow(clippy::impl_trait_in_params)]
#![allow(clippy::unnecessary_lazy_evaluations)]
#![allow(clippy::redundant_field_names)]
#![allow(clippy::needless_borrow)]
#![allow(clippy::manual_clamp)]
#![allow(clippy::map_clone)]
#![allow(clippy::option_map_or_none)]
#![allow(clippy::derivable_impls)]
#![allow(clippy::get_first)]
#![allow(clippy::host_endian_bytes)]
#![allow(clippy::io_other_error)]
#![allow(clippy::type_complexity)]
//!
//! Control plane for a multi-tenant analytical storage engine: one
//! embedded DuckDB file per table, copy-on-write dev branches, ephemeral
//! query workspaces reachable over the Postgres wire protocol, and an
//! S3-compatible surface for bulk object access.
//!
//! # Overview
//!
//! - **HTTP control plane**: project/bucket/table/branch/workspace/
//!   snapshot lifecycle, CQRS vertical slices under `features/`
//! - **Per-table engine**: DuckDB-backed schema and data operations
//! - **PG-wire session engine**: real `psql`/driver connectivity against
//!   ephemeral workspaces
//! - **S3-compatible surface**: bucket/object semantics over the same
//!   catalog, for bulk loaders that only speak S3
//! - **Metadata store**: PostgreSQL catalog of every entity above
//!
//! ## Framework Stack
//!
//! - **Axum**: HTTP control plane
//! - **SQLx**: metadata catalog
//! - **duckdb**: per-table embedded analytical engine
//! - **pgwire**: Postgres wire protocol session engine
//! - **Tower**: middleware and service abstractions

pub mod api;
pub mod audit;
pub mod auth;
pub mod branch;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod features;
pub mod jobs;
pub mod locks;
pub mod metadata;
pub mod middleware;
pub mod paths;
pub mod pgwire_session;
pub mod s3surface;
pub mod share;
pub mod snapshot;
pub mod state;
pub mod workspace;

// Re-export commonly used types
pub use error::{AppError, AppResult};
