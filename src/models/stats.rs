use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pool-level market metrics as returned by a stats source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolMetrics {
    pub price_usd: Option<f64>,
    pub liquidity_usd: Option<f64>,
    pub market_cap_usd: Option<f64>,
    pub fdv_usd: Option<f64>,
    pub holders: Option<u64>,
    pub price_change_24h: Option<f64>,
}

impl PoolMetrics {
    /// Fill every missing field from `other`
    pub fn merge_missing(&mut self, other: &PoolMetrics) {
        self.price_usd = self.price_usd.or(other.price_usd);
        self.liquidity_usd = self.liquidity_usd.or(other.liquidity_usd);
        self.market_cap_usd = self.market_cap_usd.or(other.market_cap_usd);
        self.fdv_usd = self.fdv_usd.or(other.fdv_usd);
        self.holders = self.holders.or(other.holders);
        self.price_change_24h = self.price_change_24h.or(other.price_change_24h);
    }

    pub fn is_empty(&self) -> bool {
        *self == PoolMetrics::default()
    }
}

/// Cached metrics for one pool, overwritten on every successful refresh
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub metrics: PoolMetrics,
    pub updated_at: DateTime<Utc>,
}

/// Everything a stats source can tell about a pool in one call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoolMarketData {
    pub metrics: PoolMetrics,
    pub base_symbol: Option<String>,
    pub quote_symbol: Option<String>,
    pub social_url: Option<String>,
}

impl PoolMarketData {
    pub fn merge_missing(&mut self, other: PoolMarketData) {
        self.metrics.merge_missing(&other.metrics);
        if self.base_symbol.is_none() {
            self.base_symbol = other.base_symbol;
        }
        if self.quote_symbol.is_none() {
            self.quote_symbol = other.quote_symbol;
        }
        if self.social_url.is_none() {
            self.social_url = other.social_url;
        }
    }
}
