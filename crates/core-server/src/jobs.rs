//! Background jobs: snapshot retention GC, PG-wire idle-session sweep,
//! idempotency-cache purge. Each runs as its own `tokio::spawn`ed
//! `tokio::time::interval` loop rather than a cron/queue framework —
//! there is no durable job payload to persist here, just a periodic
//! sweep over Postgres-backed state, so a plain interval loop is the
//! straightforward fit.

use std::time::Duration;

use tokio::task::JoinHandle;

use crate::state::AppState;

/// Spawns all three background loops and returns their join handles so
/// the caller can hold them for the lifetime of the process (or abort
/// them on shutdown).
pub fn spawn_all(state: AppState) -> Vec<JoinHandle<()>> {
    vec![
        spawn_snapshot_gc(state.clone()),
        spawn_pgwire_idle_sweep(state.clone()),
        spawn_idempotency_purge(state),
    ]
}

fn spawn_snapshot_gc(state: AppState) -> JoinHandle<()> {
    let interval_secs = state.config.storage_core.snapshot_gc_interval_secs;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            match crate::snapshot::run_retention_gc(&state.db).await {
                Ok(removed) if removed > 0 => {
                    tracing::info!(removed, "snapshot retention GC removed expired snapshots");
                },
                Ok(_) => {},
                Err(e) => tracing::error!(error = %e, "snapshot retention GC failed"),
            }
        }
    })
}

fn spawn_pgwire_idle_sweep(state: AppState) -> JoinHandle<()> {
    let interval_secs = state.config.storage_core.pgwire_idle_sweep_interval_secs;
    let idle_timeout_secs = state.config.storage_core.pgwire_idle_timeout_secs;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            match crate::metadata::workspaces::cleanup_idle_sessions(&state.db, idle_timeout_secs).await {
                Ok(closed) if !closed.is_empty() => {
                    tracing::info!(count = closed.len(), "closed idle pg-wire sessions");
                    for session_id in closed {
                        state.pgwire_sessions.force_close(session_id).await;
                    }
                },
                Ok(_) => {},
                Err(e) => tracing::error!(error = %e, "pg-wire idle sweep failed"),
            }
        }
    })
}

fn spawn_idempotency_purge(state: AppState) -> JoinHandle<()> {
    let interval_secs = state.config.storage_core.idempotency_purge_interval_secs;
    let ttl_secs = state.config.storage_core.idempotency_ttl_secs;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            match crate::metadata::idempotency::purge_expired(&state.db, ttl_secs).await {
                Ok(removed) if removed > 0 => {
                    tracing::info!(removed, "purged expired idempotency cache entries");
                },
                Ok(_) => {},
                Err(e) => tracing::error!(error = %e, "idempotency cache purge failed"),
            }
        }
    })
}

/// Used by the graceful-drain sequence to stop background loops before
/// the process exits.
pub fn abort_all(handles: &[JoinHandle<()>]) {
    for handle in handles {
        handle.abort();
    }
}
