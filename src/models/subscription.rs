use serde::{Deserialize, Serialize};

use crate::models::PoolKey;

/// Per-destination presentation settings. Empty fields fall back to the
/// system-wide defaults at dispatch time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub book_trend_url: String,
    pub trending_url: String,
    pub dtrade_ref: String,
}

impl DisplayConfig {
    /// Resolve against `defaults`, field by field
    pub fn resolve(&self, defaults: &DisplayConfig) -> DisplayConfig {
        fn pick(own: &str, fallback: &str) -> String {
            if own.trim().is_empty() {
                fallback.to_string()
            } else {
                own.to_string()
            }
        }

        DisplayConfig {
            book_trend_url: pick(&self.book_trend_url, &defaults.book_trend_url),
            trending_url: pick(&self.trending_url, &defaults.trending_url),
            dtrade_ref: pick(&self.dtrade_ref, &defaults.dtrade_ref),
        }
    }
}

/// A chat subscribed to a pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    pub chat_id: i64,
    pub pool: PoolKey,
    pub title: String,
    pub display: DisplayConfig,
}
