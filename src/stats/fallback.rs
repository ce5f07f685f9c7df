use async_trait::async_trait;
use log::{debug, warn};
use std::sync::Arc;

use crate::feeds::{FeedError, StatsSource};
use crate::models::{Pool, PoolMarketData};

/// Combines two stats sources: the primary answers, the secondary fills
/// whatever the primary left out and stands in when the primary fails.
pub struct FallbackStats {
    primary: Arc<dyn StatsSource>,
    secondary: Arc<dyn StatsSource>,
}

impl FallbackStats {
    pub fn new(primary: Arc<dyn StatsSource>, secondary: Arc<dyn StatsSource>) -> Self {
        Self { primary, secondary }
    }
}

fn has_gaps(data: &PoolMarketData) -> bool {
    let m = &data.metrics;
    m.price_usd.is_none()
        || m.liquidity_usd.is_none()
        || m.market_cap_usd.is_none()
        || m.price_change_24h.is_none()
        || data.social_url.is_none()
}

#[async_trait]
impl StatsSource for FallbackStats {
    fn name(&self) -> &str {
        self.primary.name()
    }

    async fn market_data(&self, pool: &Pool) -> Result<PoolMarketData, FeedError> {
        match self.primary.market_data(pool).await {
            Ok(mut data) => {
                if has_gaps(&data) {
                    match self.secondary.market_data(pool).await {
                        Ok(extra) => data.merge_missing(extra),
                        Err(e) => debug!("{} had nothing for {}: {}", self.secondary.name(), pool.key, e),
                    }
                }
                Ok(data)
            }
            Err(e) => {
                warn!(
                    "{} failed for {}, falling back to {}: {}",
                    self.primary.name(),
                    pool.key,
                    self.secondary.name(),
                    e
                );
                self.secondary.market_data(pool).await
            }
        }
    }
}
