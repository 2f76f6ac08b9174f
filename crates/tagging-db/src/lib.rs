//! # tagging-db
//!
//! PostgreSQL storage layer for the tagging engine.
//!
//! This crate provides:
//! - Connection pool management
//! - [`PgTaggingRepository`], implementing every `tagging-core` storage trait
//! - Transactional, per-entity serialized tag reconciliation
//! - Splicing of host SQL filters into usage queries
//!
//! ## Example
//!
//! ```rust,ignore
//! use tagging_db::{Database, EntityRef, TaggingConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/tagging").await?;
//!     let tagging = db.engine(TaggingConfig::from_env()?)?.with_kind("link")?;
//!
//!     let link = EntityRef::new("link", 42);
//!     tagging.update_tags(&link, Some("rust, databases")).await?;
//!     println!("{}", tagging.render(&["rust", "databases"]));
//!     Ok(())
//! }
//! ```

pub mod associations;
pub mod pool;
pub mod queries;
pub mod tags;
pub mod usage_filter;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use tagging_core::*;

pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};
pub use tags::PgTaggingRepository;
pub use usage_filter::renumber_placeholders;

/// Database context wrapping the pool and the tagging repository.
#[derive(Debug, Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Tag, association and query repository.
    pub tagging: PgTaggingRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            tagging: PgTaggingRepository::new(pool.clone()),
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }

    /// Build a tagging engine backed by this database.
    pub fn engine(&self, config: TaggingConfig) -> Result<Tagging<PgTaggingRepository>> {
        Tagging::new(self.tagging.clone(), config)
    }
}
