use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::db::{DbError, PoolRegistry, StatsStore};
use crate::models::{
    Cursor, DisplayConfig, Pool, PoolKey, PoolMetrics, StatsSnapshot, Subscription,
};

const POOL_COLUMNS: &str = "p.network, p.pool_address, p.token_address, p.symbol, p.token_name, \
     p.base_symbol, p.quote_symbol, p.social_url, p.explorer_url, p.chart_url, \
     p.last_cursor, p.last_cursor_seq";

#[derive(sqlx::FromRow)]
struct PoolRow {
    network: String,
    pool_address: String,
    token_address: Option<String>,
    symbol: Option<String>,
    token_name: Option<String>,
    base_symbol: Option<String>,
    quote_symbol: Option<String>,
    social_url: Option<String>,
    explorer_url: Option<String>,
    chart_url: Option<String>,
    last_cursor: Option<String>,
    last_cursor_seq: Option<i64>,
}

impl From<PoolRow> for Pool {
    fn from(row: PoolRow) -> Self {
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());

        Pool {
            key: PoolKey::new(row.network, row.pool_address),
            token_address: row.token_address.unwrap_or_default(),
            symbol: row.symbol.unwrap_or_default(),
            name: row.token_name.unwrap_or_default(),
            base_symbol: row.base_symbol.unwrap_or_default(),
            quote_symbol: row.quote_symbol.unwrap_or_default(),
            social_url: non_empty(row.social_url),
            explorer_url: non_empty(row.explorer_url),
            chart_url: non_empty(row.chart_url),
            last_cursor: non_empty(row.last_cursor).map(|id| {
                Cursor::new(id, row.last_cursor_seq.and_then(|s| u64::try_from(s).ok()))
            }),
        }
    }
}

#[derive(sqlx::FromRow)]
struct SubscriptionRow {
    chat_id: i64,
    network: String,
    pool_address: String,
    title: String,
    book_trend_url: String,
    trending_url: String,
    dtrade_ref: String,
}

impl From<SubscriptionRow> for Subscription {
    fn from(row: SubscriptionRow) -> Self {
        Subscription {
            chat_id: row.chat_id,
            pool: PoolKey::new(row.network, row.pool_address),
            title: row.title,
            display: DisplayConfig {
                book_trend_url: row.book_trend_url,
                trending_url: row.trending_url,
                dtrade_ref: row.dtrade_ref,
            },
        }
    }
}

#[derive(sqlx::FromRow)]
struct StatsRow {
    price_usd: Option<f64>,
    liquidity_usd: Option<f64>,
    market_cap_usd: Option<f64>,
    fdv_usd: Option<f64>,
    holders: Option<i64>,
    price_change_24h: Option<f64>,
    updated_at: String,
}

/// Database manager for handling SQLite operations
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at a file path or `sqlite:` URL
    pub async fn new(database_url: &str) -> Result<Self, DbError> {
        let in_memory = database_url.contains(":memory:");

        let options = if database_url.starts_with("sqlite:") {
            SqliteConnectOptions::from_str(database_url)?
        } else {
            SqliteConnectOptions::new().filename(database_url)
        };
        let options = if in_memory {
            options
        } else {
            options
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
        };

        // Every in-memory connection is its own database, so keep exactly one alive
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await?;

        // Initialize schema if needed
        let db = Self { pool };
        db.init_schema().await?;

        Ok(db)
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<(), DbError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS pools (
                network TEXT NOT NULL,
                pool_address TEXT NOT NULL,
                token_address TEXT,
                symbol TEXT,
                token_name TEXT,
                base_symbol TEXT,
                quote_symbol TEXT,
                social_url TEXT,
                explorer_url TEXT,
                chart_url TEXT,
                last_cursor TEXT,
                last_cursor_seq INTEGER,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (network, pool_address)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS pool_stats (
                network TEXT NOT NULL,
                pool_address TEXT NOT NULL,
                price_usd REAL,
                liquidity_usd REAL,
                market_cap_usd REAL,
                fdv_usd REAL,
                holders INTEGER,
                price_change_24h REAL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (network, pool_address)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS groups (
                chat_id INTEGER PRIMARY KEY,
                title TEXT,
                book_trend_url TEXT,
                trending_url TEXT,
                dtrade_ref TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS group_pools (
                chat_id INTEGER NOT NULL,
                network TEXT NOT NULL,
                pool_address TEXT NOT NULL,
                token_address TEXT,
                enabled INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (chat_id, network, pool_address),
                FOREIGN KEY (network, pool_address) REFERENCES pools (network, pool_address)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_group_pools_pool ON group_pools (network, pool_address)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a pool or refresh its metadata. Empty fields never overwrite
    /// stored values and the cursor is left alone.
    pub async fn upsert_pool(&self, pool: &Pool) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO pools (network, pool_address, token_address, symbol, token_name,
                                base_symbol, quote_symbol, social_url, explorer_url, chart_url)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (network, pool_address) DO UPDATE SET
                token_address = COALESCE(NULLIF(excluded.token_address, ''), pools.token_address),
                symbol = COALESCE(NULLIF(excluded.symbol, ''), pools.symbol),
                token_name = COALESCE(NULLIF(excluded.token_name, ''), pools.token_name),
                base_symbol = COALESCE(NULLIF(excluded.base_symbol, ''), pools.base_symbol),
                quote_symbol = COALESCE(NULLIF(excluded.quote_symbol, ''), pools.quote_symbol),
                social_url = COALESCE(NULLIF(excluded.social_url, ''), pools.social_url),
                explorer_url = COALESCE(NULLIF(excluded.explorer_url, ''), pools.explorer_url),
                chart_url = COALESCE(NULLIF(excluded.chart_url, ''), pools.chart_url)",
        )
        .bind(&pool.key.network)
        .bind(&pool.key.address)
        .bind(&pool.token_address)
        .bind(&pool.symbol)
        .bind(&pool.name)
        .bind(&pool.base_symbol)
        .bind(&pool.quote_symbol)
        .bind(pool.social_url.as_deref().unwrap_or(""))
        .bind(pool.explorer_url.as_deref().unwrap_or(""))
        .bind(pool.chart_url.as_deref().unwrap_or(""))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_pool(&self, key: &PoolKey) -> Result<Option<Pool>, DbError> {
        let sql = format!(
            "SELECT {} FROM pools p WHERE p.network = ? AND p.pool_address = ?",
            POOL_COLUMNS
        );
        let row = sqlx::query_as::<_, PoolRow>(&sql)
            .bind(&key.network)
            .bind(&key.address)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Pool::from))
    }

    /// Every registered pool, newest registration first
    pub async fn list_pools(&self) -> Result<Vec<Pool>, DbError> {
        let sql = format!(
            "SELECT {} FROM pools p ORDER BY p.created_at DESC, p.pool_address",
            POOL_COLUMNS
        );
        let rows = sqlx::query_as::<_, PoolRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Pool::from).collect())
    }

    /// Create the group row if missing, keeping the title fresh
    pub async fn upsert_group(&self, chat_id: i64, title: &str) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO groups (chat_id, title) VALUES (?, ?)
             ON CONFLICT (chat_id) DO UPDATE SET
                title = COALESCE(NULLIF(excluded.title, ''), groups.title)",
        )
        .bind(chat_id)
        .bind(title)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn set_group_links(
        &self,
        chat_id: i64,
        book_trend_url: &str,
        trending_url: &str,
    ) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO groups (chat_id, book_trend_url, trending_url) VALUES (?, ?, ?)
             ON CONFLICT (chat_id) DO UPDATE SET
                book_trend_url = excluded.book_trend_url,
                trending_url = excluded.trending_url",
        )
        .bind(chat_id)
        .bind(book_trend_url)
        .bind(trending_url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn set_group_referral(&self, chat_id: i64, dtrade_ref: &str) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO groups (chat_id, dtrade_ref) VALUES (?, ?)
             ON CONFLICT (chat_id) DO UPDATE SET dtrade_ref = excluded.dtrade_ref",
        )
        .bind(chat_id)
        .bind(dtrade_ref)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Subscribe a chat to a pool. Subscribing again re-enables the row and
    /// refreshes its metadata instead of duplicating it.
    pub async fn subscribe(
        &self,
        chat_id: i64,
        pool: &PoolKey,
        token_address: &str,
    ) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO group_pools (chat_id, network, pool_address, token_address, enabled)
             VALUES (?, ?, ?, ?, 1)
             ON CONFLICT (chat_id, network, pool_address) DO UPDATE SET
                token_address = COALESCE(NULLIF(excluded.token_address, ''), group_pools.token_address),
                enabled = 1",
        )
        .bind(chat_id)
        .bind(&pool.network)
        .bind(&pool.address)
        .bind(token_address)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Returns the number of subscriptions removed
    pub async fn unsubscribe(&self, chat_id: i64, pool: &PoolKey) -> Result<u64, DbError> {
        let result = sqlx::query(
            "DELETE FROM group_pools WHERE chat_id = ? AND network = ? AND pool_address = ?",
        )
        .bind(chat_id)
        .bind(&pool.network)
        .bind(&pool.address)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Remove every subscription of a chat to pools of the given token
    pub async fn unsubscribe_token(
        &self,
        chat_id: i64,
        network: &str,
        token_address: &str,
    ) -> Result<u64, DbError> {
        let result = sqlx::query(
            "DELETE FROM group_pools WHERE chat_id = ? AND network = ? AND token_address = ?",
        )
        .bind(chat_id)
        .bind(network)
        .bind(token_address)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Pools a chat is subscribed to
    pub async fn list_group_pools(&self, chat_id: i64) -> Result<Vec<Pool>, DbError> {
        let sql = format!(
            "SELECT {} FROM group_pools gp
             JOIN pools p ON p.network = gp.network AND p.pool_address = gp.pool_address
             WHERE gp.chat_id = ? AND gp.enabled = 1
             ORDER BY gp.created_at DESC, p.pool_address",
            POOL_COLUMNS
        );
        let rows = sqlx::query_as::<_, PoolRow>(&sql)
            .bind(chat_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Pool::from).collect())
    }
}

#[async_trait]
impl PoolRegistry for Database {
    async fn list_tracked_pools(&self) -> Result<Vec<Pool>, DbError> {
        let sql = format!(
            "SELECT DISTINCT {} FROM pools p
             JOIN group_pools gp ON gp.network = p.network AND gp.pool_address = p.pool_address
             WHERE gp.enabled = 1
             ORDER BY p.network, p.pool_address",
            POOL_COLUMNS
        );
        let rows = sqlx::query_as::<_, PoolRow>(&sql)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Pool::from).collect())
    }

    async fn advance_cursor(&self, pool: &PoolKey, cursor: &Cursor) -> Result<(), DbError> {
        let sequence = cursor.sequence.and_then(|s| i64::try_from(s).ok());

        sqlx::query(
            "UPDATE pools SET last_cursor = ?, last_cursor_seq = ?
             WHERE network = ? AND pool_address = ?",
        )
        .bind(&cursor.trade_id)
        .bind(sequence)
        .bind(&pool.network)
        .bind(&pool.address)
        .execute(&self.pool)
        .await?;

        debug!("Cursor for {} set to {}", pool, cursor.trade_id);
        Ok(())
    }

    async fn list_destinations(&self, pool: &PoolKey) -> Result<Vec<Subscription>, DbError> {
        let rows = sqlx::query_as::<_, SubscriptionRow>(
            "SELECT gp.chat_id, gp.network, gp.pool_address,
                    COALESCE(g.title, '') AS title,
                    COALESCE(g.book_trend_url, '') AS book_trend_url,
                    COALESCE(g.trending_url, '') AS trending_url,
                    COALESCE(g.dtrade_ref, '') AS dtrade_ref
             FROM group_pools gp
             LEFT JOIN groups g ON g.chat_id = gp.chat_id
             WHERE gp.network = ? AND gp.pool_address = ? AND gp.enabled = 1
             ORDER BY gp.created_at, gp.chat_id",
        )
        .bind(&pool.network)
        .bind(&pool.address)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Subscription::from).collect())
    }
}

#[async_trait]
impl StatsStore for Database {
    async fn get_stats(&self, pool: &PoolKey) -> Result<Option<StatsSnapshot>, DbError> {
        let row = sqlx::query_as::<_, StatsRow>(
            "SELECT price_usd, liquidity_usd, market_cap_usd, fdv_usd, holders,
                    price_change_24h, updated_at
             FROM pool_stats WHERE network = ? AND pool_address = ?",
        )
        .bind(&pool.network)
        .bind(&pool.address)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let updated_at = DateTime::parse_from_rfc3339(&row.updated_at)
            .map_err(|_| DbError::Corrupt {
                column: "pool_stats.updated_at",
                value: row.updated_at.clone(),
            })?
            .with_timezone(&Utc);

        Ok(Some(StatsSnapshot {
            metrics: PoolMetrics {
                price_usd: row.price_usd,
                liquidity_usd: row.liquidity_usd,
                market_cap_usd: row.market_cap_usd,
                fdv_usd: row.fdv_usd,
                holders: row.holders.and_then(|h| u64::try_from(h).ok()),
                price_change_24h: row.price_change_24h,
            },
            updated_at,
        }))
    }

    async fn put_stats(&self, pool: &PoolKey, metrics: &PoolMetrics) -> Result<StatsSnapshot, DbError> {
        let updated_at = Utc::now();
        let holders = metrics.holders.and_then(|h| i64::try_from(h).ok());

        sqlx::query(
            "INSERT INTO pool_stats (network, pool_address, price_usd, liquidity_usd, market_cap_usd,
                                     fdv_usd, holders, price_change_24h, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (network, pool_address) DO UPDATE SET
                price_usd = excluded.price_usd,
                liquidity_usd = excluded.liquidity_usd,
                market_cap_usd = excluded.market_cap_usd,
                fdv_usd = excluded.fdv_usd,
                holders = excluded.holders,
                price_change_24h = excluded.price_change_24h,
                updated_at = excluded.updated_at",
        )
        .bind(&pool.network)
        .bind(&pool.address)
        .bind(metrics.price_usd)
        .bind(metrics.liquidity_usd)
        .bind(metrics.market_cap_usd)
        .bind(metrics.fdv_usd)
        .bind(holders)
        .bind(metrics.price_change_24h)
        .bind(updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(StatsSnapshot {
            metrics: metrics.clone(),
            updated_at,
        })
    }

    async fn update_market_info(
        &self,
        pool: &PoolKey,
        base_symbol: Option<&str>,
        quote_symbol: Option<&str>,
        social_url: Option<&str>,
    ) -> Result<(), DbError> {
        // Symbols follow the source; a social link set by the operator wins
        sqlx::query(
            "UPDATE pools SET
                base_symbol = COALESCE(NULLIF(?, ''), base_symbol),
                quote_symbol = COALESCE(NULLIF(?, ''), quote_symbol),
                social_url = COALESCE(NULLIF(social_url, ''), NULLIF(?, ''))
             WHERE network = ? AND pool_address = ?",
        )
        .bind(base_symbol.unwrap_or(""))
        .bind(quote_symbol.unwrap_or(""))
        .bind(social_url.unwrap_or(""))
        .bind(&pool.network)
        .bind(&pool.address)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Initialize an in-memory database for testing
#[cfg(test)]
pub async fn init_test_db() -> Result<Database, DbError> {
    Database::new("sqlite::memory:").await
}
