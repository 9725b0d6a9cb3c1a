//! Configuration management

use serde::{Deserialize, Serialize};

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/storage_core";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

/// Default on-disk root for all per-table DuckDB files.
pub const DEFAULT_DATA_ROOT: &str = "./data";

/// Default bind address for the PG-wire listener.
pub const DEFAULT_PGWIRE_HOST: &str = "127.0.0.1";
pub const DEFAULT_PGWIRE_PORT: u16 = 5433;

/// Default per-workspace and global PG-wire session caps.
pub const DEFAULT_PGWIRE_MAX_SESSIONS_PER_WORKSPACE: i64 = 10;
pub const DEFAULT_PGWIRE_IDLE_TIMEOUT_SECS: i64 = 1800;
pub const DEFAULT_PGWIRE_QUERY_TIMEOUT_SECS: u64 = 300;

/// Default table lock acquisition timeout.
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 30;

/// Default background-job intervals and TTLs.
pub const DEFAULT_SNAPSHOT_GC_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_PGWIRE_IDLE_SWEEP_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_IDEMPOTENCY_PURGE_INTERVAL_SECS: u64 = 3600;
pub const DEFAULT_IDEMPOTENCY_TTL_SECS: i64 = 86_400;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub storage_core: StorageCoreConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// Settings specific to this crate's domain: where table files live, the
/// admin secret, PG-wire limits and job cadence. Kept as a nested struct
/// (rather than flattened into `ServerConfig`) so it reads as "the
/// storage-core-specific half" of the config at a glance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageCoreConfig {
    /// Root directory under which `duckdb/project_*/...` trees live.
    pub data_root: String,
    /// Process-wide admin secret. Never hashed, never stored; compared
    /// in constant time against presented credentials.
    pub admin_secret: String,
    pub pgwire_host: String,
    pub pgwire_port: u16,
    pub pgwire_max_sessions_per_workspace: i64,
    pub pgwire_idle_timeout_secs: i64,
    pub pgwire_query_timeout_secs: u64,
    pub lock_timeout_secs: u64,
    pub snapshot_gc_interval_secs: u64,
    pub pgwire_idle_sweep_interval_secs: u64,
    pub idempotency_purge_interval_secs: u64,
    pub idempotency_ttl_secs: i64,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: std::env::var("BDP_HOST").unwrap_or_else(|_| DEFAULT_SERVER_HOST.to_string()),
                port: std::env::var("BDP_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SERVER_PORT),
                shutdown_timeout_secs: std::env::var("BDP_SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: std::env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: std::env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: std::env::var("DATABASE_CONNECT_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
                idle_timeout_secs: std::env::var("DATABASE_IDLE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
            },
            cors: CorsConfig {
                allowed_origins: std::env::var("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|_| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
                allow_credentials: std::env::var("CORS_ALLOW_CREDENTIALS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(true),
            },
            storage_core: StorageCoreConfig {
                data_root: std::env::var("STORAGE_CORE_DATA_ROOT")
                    .unwrap_or_else(|_| DEFAULT_DATA_ROOT.to_string()),
                admin_secret: std::env::var("STORAGE_CORE_ADMIN_SECRET").unwrap_or_default(),
                pgwire_host: std::env::var("STORAGE_CORE_PGWIRE_HOST")
                    .unwrap_or_else(|_| DEFAULT_PGWIRE_HOST.to_string()),
                pgwire_port: std::env::var("STORAGE_CORE_PGWIRE_PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_PGWIRE_PORT),
                pgwire_max_sessions_per_workspace: std::env::var("STORAGE_CORE_PGWIRE_MAX_SESSIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_PGWIRE_MAX_SESSIONS_PER_WORKSPACE),
                pgwire_idle_timeout_secs: std::env::var("STORAGE_CORE_PGWIRE_IDLE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_PGWIRE_IDLE_TIMEOUT_SECS),
                pgwire_query_timeout_secs: std::env::var("STORAGE_CORE_PGWIRE_QUERY_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_PGWIRE_QUERY_TIMEOUT_SECS),
                lock_timeout_secs: std::env::var("STORAGE_CORE_LOCK_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_LOCK_TIMEOUT_SECS),
                snapshot_gc_interval_secs: std::env::var("STORAGE_CORE_SNAPSHOT_GC_INTERVAL")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_SNAPSHOT_GC_INTERVAL_SECS),
                pgwire_idle_sweep_interval_secs: std::env::var("STORAGE_CORE_PGWIRE_SWEEP_INTERVAL")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_PGWIRE_IDLE_SWEEP_INTERVAL_SECS),
                idempotency_purge_interval_secs: std::env::var("STORAGE_CORE_IDEMPOTENCY_PURGE_INTERVAL")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_IDEMPOTENCY_PURGE_INTERVAL_SECS),
                idempotency_ttl_secs: std::env::var("STORAGE_CORE_IDEMPOTENCY_TTL")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_IDEMPOTENCY_TTL_SECS),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        // Validate port
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        // Validate database URL
        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        // Validate connection pool settings
        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        // Validate CORS origins
        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        if self.storage_core.data_root.is_empty() {
            anyhow::bail!("storage_core.data_root cannot be empty");
        }

        if self.storage_core.admin_secret.is_empty() {
            tracing::warn!("STORAGE_CORE_ADMIN_SECRET is unset - admin authentication is disabled");
        }

        if self.storage_core.pgwire_port == 0 {
            anyhow::bail!("storage_core.pgwire_port must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: true,
            },
            storage_core: StorageCoreConfig {
                data_root: DEFAULT_DATA_ROOT.to_string(),
                admin_secret: String::new(),
                pgwire_host: DEFAULT_PGWIRE_HOST.to_string(),
                pgwire_port: DEFAULT_PGWIRE_PORT,
                pgwire_max_sessions_per_workspace: DEFAULT_PGWIRE_MAX_SESSIONS_PER_WORKSPACE,
                pgwire_idle_timeout_secs: DEFAULT_PGWIRE_IDLE_TIMEOUT_SECS,
                pgwire_query_timeout_secs: DEFAULT_PGWIRE_QUERY_TIMEOUT_SECS,
                lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
                snapshot_gc_interval_secs: DEFAULT_SNAPSHOT_GC_INTERVAL_SECS,
                pgwire_idle_sweep_interval_secs: DEFAULT_PGWIRE_IDLE_SWEEP_INTERVAL_SECS,
                idempotency_purge_interval_secs: DEFAULT_IDEMPOTENCY_PURGE_INTERVAL_SECS,
                idempotency_ttl_secs: DEFAULT_IDEMPOTENCY_TTL_SECS,
            },
        }
    }
}
