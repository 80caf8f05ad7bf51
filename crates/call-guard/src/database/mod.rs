//! SQLite persistence shared by the blocklist and the call history.

pub mod schema;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::error::Result;

/// Call guard database manager
#[derive(Clone)]
pub struct CallGuardDatabase {
    pool: SqlitePool,
}

impl CallGuardDatabase {
    /// Open (creating if needed) the database and initialize the schema
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!("Initializing call guard database at {}", config.url);

        let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);

        // Every connection to `:memory:` is a separate database, so keep one
        // connection alive for the lifetime of the pool.
        let pool_options = if config.is_in_memory() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections)
        };

        let pool = pool_options.connect_with(options).await?;
        let database = Self { pool };
        database.initialize_schema().await?;

        info!("Call guard database initialized");
        Ok(database)
    }

    /// Private in-memory database for tests and dry runs
    pub async fn new_in_memory() -> Result<Self> {
        Self::connect(&DatabaseConfig::in_memory()).await
    }

    async fn initialize_schema(&self) -> Result<()> {
        debug!("Creating call guard schema");
        schema::create_blocked_numbers_table(&self.pool).await?;
        schema::create_call_records_table(&self.pool).await?;
        schema::create_indexes(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the pool; later operations fail with `StoreUnavailable`
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
