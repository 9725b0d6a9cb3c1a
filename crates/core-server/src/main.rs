//! Storage core - main entry point.
//!
//! Starts three things side by side: the HTTP control plane (REST +
//! internal PG-wire admin + S3-compatible surface), the PG-wire TCP
//! listener workspace clients connect to directly, and the background
//! job loops (snapshot GC, idle-session sweep, idempotency purge). All
//! three share one [`AppState`] and drain together on shutdown.

use anyhow::Result;
use core_common::logging::{init_logging, LogConfig};
use core_server::{
    config::Config,
    db::{create_pool, DbConfig},
    jobs, pgwire_session,
    state::AppState,
};
use std::{net::SocketAddr, time::Duration};
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::builder()
        .log_file_prefix("storage-core".to_string())
        .filter_directives("core_server=debug,tower_http=debug,axum=trace,sqlx=info".to_string())
        .build();
    let log_config = LogConfig::from_env().unwrap_or(log_config);
    init_logging(&log_config)?;

    info!("starting storage core");

    let config = Config::load()?;
    info!(host = %config.server.host, port = config.server.port, "configuration loaded");

    let db_config = DbConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        min_connections: config.database.min_connections,
        connect_timeout_secs: config.database.connect_timeout_secs,
        idle_timeout_secs: Some(config.database.idle_timeout_secs),
        max_lifetime_secs: None,
    };
    let db_pool = create_pool(&db_config).await?;

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("failed to run migrations: {e}"))?;
    info!("database migrations completed");

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout_secs);
    let pgwire_host = config.storage_core.pgwire_host.clone();
    let pgwire_port = config.storage_core.pgwire_port;

    let state = AppState::new(db_pool, config.clone());
    let job_handles = jobs::spawn_all(state.clone());

    let app = core_server::api::router(state.clone());
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "http control plane listening");

    let (pgwire_shutdown_tx, pgwire_shutdown_rx) = tokio::sync::watch::channel(false);
    let pgwire_state = state.clone();
    let pgwire_handle = tokio::spawn(async move {
        if let Err(e) = pgwire_session::serve(pgwire_state, pgwire_shutdown_rx).await {
            tracing::error!(error = %e, "pg-wire listener exited with error");
        }
    });
    info!(host = %pgwire_host, port = pgwire_port, "pg-wire listener listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("http control plane stopped accepting, draining pg-wire sessions");
    let _ = pgwire_shutdown_tx.send(true);
    state.pgwire_sessions.initiate_shutdown(shutdown_timeout).await;
    let _ = core_server::metadata::workspaces::drain_all_sessions(&state.db).await;
    let _ = pgwire_handle.await;

    jobs::abort_all(&job_handles);

    info!("storage core shut down gracefully");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM so both the HTTP server and the PG-wire
/// listener start draining at the same moment.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to install Ctrl+C handler: {e}");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => tracing::error!("failed to install SIGTERM handler: {e}"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, starting graceful shutdown"),
        _ = terminate => info!("received terminate signal, starting graceful shutdown"),
    }
}
