//! Upstream data sources: trade feeds and pool statistics.
//!
//! Every source normalizes its own payload shape into the crate's models,
//! so the polling core never sees raw API JSON.

pub mod dexscreener;
pub mod geckoterminal;
pub mod http;

pub use dexscreener::DexScreener;
pub use geckoterminal::{GeckoTerminal, PoolCandidate, TokenProfile};
pub use http::{HttpClient, RetryConfig};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Pool, PoolMarketData, Trade};

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
    #[error("Malformed payload from {url}: {reason}")]
    Decode { url: String, reason: String },
    #[error("No data for pool {0}")]
    NotFound(String),
}

/// Converts one raw feed record into a [`Trade`]. Records that cannot be
/// identified yield `None` and are dropped.
pub trait NormalizeTrade {
    fn normalize(&self) -> Option<Trade>;
}

/// Source of recent trades for a pool
#[async_trait]
pub trait TradeFeed: Send + Sync {
    fn name(&self) -> &str;

    /// Up to `limit` recent trades in the feed's own order, usually newest first
    async fn fetch_recent_trades(&self, pool: &Pool, limit: usize) -> Result<Vec<Trade>, FeedError>;
}

/// Source of pool-level market metrics
#[async_trait]
pub trait StatsSource: Send + Sync {
    fn name(&self) -> &str;

    async fn market_data(&self, pool: &Pool) -> Result<PoolMarketData, FeedError>;
}
