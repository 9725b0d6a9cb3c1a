//! Metadata store (component C): the durable Postgres-backed catalog of
//! every entity the engine, auth, snapshot, branch, share, and workspace
//! layers need to resolve a request before ever touching a `.duckdb`
//! file. One submodule per entity family, mirroring the teacher's
//! `db::archive::<entity>` layout.

pub mod api_keys;
pub mod buckets;
pub mod files;
pub mod idempotency;
pub mod models;
pub mod ops_log;
pub mod projects;
pub mod shares;
pub mod snapshots;
pub mod workspaces;
