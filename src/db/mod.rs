mod sqlite;

pub use sqlite::Database;

#[cfg(test)]
pub use sqlite::init_test_db;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Cursor, Pool, PoolKey, PoolMetrics, StatsSnapshot, Subscription};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Corrupt value in column {column}: {value}")]
    Corrupt { column: &'static str, value: String },
}

/// Durable pool and subscription state read and written by the watcher
#[async_trait]
pub trait PoolRegistry: Send + Sync {
    /// Pools with at least one enabled subscription
    async fn list_tracked_pools(&self) -> Result<Vec<Pool>, DbError>;

    /// Overwrite the pool's cursor
    async fn advance_cursor(&self, pool: &PoolKey, cursor: &Cursor) -> Result<(), DbError>;

    /// Enabled subscriptions for a pool, oldest first
    async fn list_destinations(&self, pool: &PoolKey) -> Result<Vec<Subscription>, DbError>;
}

/// Storage behind the stats cache
#[async_trait]
pub trait StatsStore: Send + Sync {
    async fn get_stats(&self, pool: &PoolKey) -> Result<Option<StatsSnapshot>, DbError>;

    /// Replace the stored snapshot wholesale
    async fn put_stats(&self, pool: &PoolKey, metrics: &PoolMetrics) -> Result<StatsSnapshot, DbError>;

    /// Record pool metadata learned during a stats refresh.
    /// `None` leaves the stored value untouched.
    async fn update_market_info(
        &self,
        pool: &PoolKey,
        base_symbol: Option<&str>,
        quote_symbol: Option<&str>,
        social_url: Option<&str>,
    ) -> Result<(), DbError>;
}
