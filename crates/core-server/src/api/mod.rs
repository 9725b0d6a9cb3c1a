//! Top-level HTTP router: wires the REST control plane, the internal
//! PG-wire admin surface, and the S3-compatible object surface behind
//! the shared middleware stack (audit, tracing, CORS).

pub mod response;

use axum::{http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;

use crate::state::AppState;
use crate::{audit, features, middleware, s3surface};

/// Builds the full application router against an already-constructed
/// [`AppState`]. Layers apply innermost-first: audit wraps the routes,
/// tracing wraps audit, CORS is outermost.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .nest("/api/v1", features::router())
        .merge(features::internal_router())
        .nest("/s3", s3surface::router())
        .layer(audit::AuditLayer::new(state.db.clone()))
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&state.config.cors))
        .with_state(state)
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "storage-core",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running"
    }))
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
