//! Feature routes for the tenant-facing REST surface.
//!
//! Each module is a thin vertical slice over one or two of the core
//! engines (A-K): it extracts and authorizes the request, then calls
//! straight into `engine`/`branch`/`snapshot`/`share`/`workspace` or the
//! `metadata` catalog layer. There is no separate command/query layer
//! here — every handler already has a uniform `AppError` and
//! `ApiResponse` to work with, so a heavier CQRS split would just be
//! indirection without a second implementation to decouple from.

pub mod branches;
pub mod buckets;
pub mod driver;
pub mod files;
pub mod pgwire_admin;
pub mod projects;
pub mod settings;
pub mod shared;
pub mod shares;
pub mod snapshots;
pub mod workspaces;

use axum::Router;

use crate::state::AppState;

/// Mounts every feature router. `projects` is rooted at `/` (so it
/// lands at `/projects` and `/projects/{pid}`); the rest are rooted at
/// `/:pid/...` and merge together under the same prefix. The internal
/// PG-wire admin surface is mounted separately, under `/internal`.
pub fn router() -> Router<AppState> {
    let projects_scoped = Router::new()
        .merge(buckets::router())
        .merge(branches::router())
        .merge(workspaces::router())
        .merge(snapshots::router())
        .merge(shares::router())
        .merge(settings::router())
        .merge(files::router());

    Router::new()
        .nest("/projects", projects::router().merge(projects_scoped))
        .nest("/driver", driver::router())
}

/// The internal surface used only by the PG-wire listener itself.
pub fn internal_router() -> Router<AppState> {
    Router::new().nest("/internal", pgwire_admin::router())
}
