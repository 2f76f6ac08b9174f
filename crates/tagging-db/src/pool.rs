//! PostgreSQL connection pool for the tagging store.
//!
//! Pools are sized and timed through [`PoolConfig`], which can also be read
//! from `TAGGING_DB_*` environment variables. A configured search path
//! scopes every pooled connection to one schema.

use std::env;
use std::str::FromStr;
use std::time::{Duration, Instant};

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use tracing::{debug, info, warn};

use tagging_core::{Error, Result};

/// Default maximum number of connections in the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;

/// Default acquire timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default idle timeout in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default maximum connection lifetime in seconds.
pub const DEFAULT_MAX_LIFETIME_SECS: u64 = 1800;

const ENV_MAX_CONNECTIONS: &str = "TAGGING_DB_MAX_CONNECTIONS";
const ENV_MIN_CONNECTIONS: &str = "TAGGING_DB_MIN_CONNECTIONS";
const ENV_CONNECT_TIMEOUT: &str = "TAGGING_DB_CONNECT_TIMEOUT_SECS";
const ENV_SEARCH_PATH: &str = "TAGGING_DB_SEARCH_PATH";

/// Pool sizing, timeouts and schema scoping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long to wait for a free connection.
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Option<Duration>,
    /// Schema searched before `public` on every connection.
    pub search_path: Option<String>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            min_connections: 1,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
            max_lifetime: Some(Duration::from_secs(DEFAULT_MAX_LIFETIME_SECS)),
            search_path: None,
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `TAGGING_DB_*` variables that are set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(n) = env_number(ENV_MAX_CONNECTIONS)? {
            config.max_connections = connection_count(ENV_MAX_CONNECTIONS, n)?;
        }
        if let Some(n) = env_number(ENV_MIN_CONNECTIONS)? {
            config.min_connections = connection_count(ENV_MIN_CONNECTIONS, n)?;
        }
        if let Some(secs) = env_number(ENV_CONNECT_TIMEOUT)? {
            config.connect_timeout = Duration::from_secs(secs);
        }
        if let Ok(schema) = env::var(ENV_SEARCH_PATH) {
            if !schema.trim().is_empty() {
                config.search_path = Some(schema.trim().to_string());
            }
        }
        if config.min_connections > config.max_connections {
            return Err(Error::Config(format!(
                "{} ({}) exceeds {} ({})",
                ENV_MIN_CONNECTIONS,
                config.min_connections,
                ENV_MAX_CONNECTIONS,
                config.max_connections
            )));
        }
        Ok(config)
    }

    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    pub fn min_connections(mut self, n: u32) -> Self {
        self.min_connections = n;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Resolve unqualified table names against `schema` first.
    pub fn search_path(mut self, schema: impl Into<String>) -> Self {
        self.search_path = Some(schema.into());
        self
    }

    fn connect_options(&self, database_url: &str) -> Result<PgConnectOptions> {
        let options = PgConnectOptions::from_str(database_url).map_err(Error::Database)?;
        Ok(match &self.search_path {
            Some(schema) => options.options([("search_path", format!("{},public", schema))]),
            None => options,
        })
    }
}

fn env_number(key: &str) -> Result<Option<u64>> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| {
            Error::Config(format!("{} must be a non-negative integer, got {:?}", key, raw))
        }),
        Err(_) => Ok(None),
    }
}

fn connection_count(key: &str, n: u64) -> Result<u32> {
    u32::try_from(n).map_err(|_| Error::Config(format!("{} is too large: {}", key, n)))
}

/// Connect a pool with default configuration.
pub async fn create_pool(database_url: &str) -> Result<PgPool> {
    create_pool_with_config(database_url, PoolConfig::default()).await
}

/// Connect a pool with the given configuration.
pub async fn create_pool_with_config(database_url: &str, config: PoolConfig) -> Result<PgPool> {
    let start = Instant::now();

    info!(
        subsystem = "database",
        component = "pool",
        op = "create",
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        connect_timeout_secs = config.connect_timeout.as_secs(),
        search_path = config.search_path.as_deref().unwrap_or("default"),
        "Creating tagging connection pool"
    );

    let connect = config.connect_options(database_url)?;
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout)
        .idle_timeout(config.idle_timeout)
        .max_lifetime(config.max_lifetime)
        .connect_with(connect)
        .await
        .map_err(Error::Database)?;

    info!(
        subsystem = "database",
        component = "pool",
        op = "established",
        pool_size = pool.size(),
        pool_idle = pool.num_idle(),
        duration_ms = start.elapsed().as_millis() as u64,
        "Tagging connection pool established"
    );
    Ok(pool)
}

/// Emit pool size and idle count; warns when nothing is idle.
pub fn log_pool_metrics(pool: &PgPool) {
    let (size, idle) = (pool.size(), pool.num_idle());
    debug!(
        subsystem = "database",
        component = "pool",
        op = "metrics",
        pool_size = size,
        pool_idle = idle,
        "Pool health check"
    );
    if idle == 0 && size > 0 {
        warn!(
            subsystem = "database",
            component = "pool",
            pool_size = size,
            "Connection pool has no idle connections"
        );
    }
}
