//! Shared SQLite pools.
//!
//! Services that need persistence share one pool per name instead of opening
//! their own connections. Pools are closed together on shutdown.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Database connection pool type alias.
pub type DbPool = Pool<Sqlite>;

/// Name of the pool opened at startup.
pub const DEFAULT_POOL: &str = "default";

/// Default connection pool size.
const DEFAULT_POOL_SIZE: u32 = 5;

/// Default busy timeout in milliseconds.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 30_000;

/// Open a pool with WAL mode.
pub async fn init_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    let connect_options = SqliteConnectOptions::from_str(database_url)?
        // Enable WAL mode for concurrent reads during writes
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(DEFAULT_POOL_SIZE)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(connect_options)
        .await?;

    info!(
        "Database pool initialized with WAL mode, {} max connections",
        DEFAULT_POOL_SIZE
    );

    Ok(pool)
}

/// Named pools shared across services.
#[derive(Default)]
pub struct PoolRegistry {
    pools: Mutex<HashMap<String, DbPool>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the pool called `name`, opening it with `database_url` on first use.
    ///
    /// Later calls return the existing pool and ignore `database_url`.
    pub async fn get_or_connect(&self, name: &str, database_url: &str) -> Result<DbPool, sqlx::Error> {
        let mut pools = self.pools.lock().await;
        if let Some(pool) = pools.get(name) {
            return Ok(pool.clone());
        }
        let pool = init_pool(database_url).await?;
        pools.insert(name.to_string(), pool.clone());
        debug!(name, "Registered shared pool");
        Ok(pool)
    }

    pub async fn get(&self, name: &str) -> Option<DbPool> {
        self.pools.lock().await.get(name).cloned()
    }

    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.lock().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Close and forget every pool. Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let pools: Vec<(String, DbPool)> = self.pools.lock().await.drain().collect();
        let count = pools.len();
        for (name, pool) in pools {
            pool.close().await;
            debug!(name = %name, "Closed shared pool");
        }
        count
    }
}
