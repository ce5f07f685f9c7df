use log::{debug, info, warn};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::db::StatsStore;
use crate::feeds::StatsSource;
use crate::models::{Pool, StatsSnapshot};
use crate::stats::StatsError;

/// Cached pool statistics backed by a [`StatsStore`].
///
/// Reads never touch the network. Refreshes replace the snapshot wholesale,
/// and a failed refresh leaves the previous snapshot in place.
#[derive(Clone)]
pub struct StatsCache {
    store: Arc<dyn StatsStore>,
    source: Arc<dyn StatsSource>,
    next: Arc<AtomicUsize>,
}

impl StatsCache {
    pub fn new(store: Arc<dyn StatsStore>, source: Arc<dyn StatsSource>) -> Self {
        Self {
            store,
            source,
            next: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Fetch fresh metrics for `pool` and store them
    pub async fn refresh(&self, pool: &Pool) -> Result<StatsSnapshot, StatsError> {
        let data = self.source.market_data(pool).await?;
        if data.metrics.is_empty() {
            return Err(StatsError::Empty(pool.key.to_string()));
        }

        let snapshot = self.store.put_stats(&pool.key, &data.metrics).await?;
        self.store
            .update_market_info(
                &pool.key,
                data.base_symbol.as_deref(),
                data.quote_symbol.as_deref(),
                data.social_url.as_deref(),
            )
            .await?;

        debug!("Refreshed stats for {} from {}", pool.key, self.source.name());
        Ok(snapshot)
    }

    /// Latest snapshot, or `None` when none was ever stored or the store is unreadable
    pub async fn get(&self, pool: &Pool) -> Option<StatsSnapshot> {
        match self.store.get_stats(&pool.key).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Failed to read stats for {}: {}", pool.key, e);
                None
            }
        }
    }

    /// Refresh the next pool in round-robin order.
    ///
    /// Returns `None` when there is nothing to refresh.
    pub async fn refresh_next(&self, pools: &[Pool]) -> Option<Result<StatsSnapshot, StatsError>> {
        if pools.is_empty() {
            return None;
        }

        let index = self.next.fetch_add(1, Ordering::Relaxed) % pools.len();
        let pool = &pools[index];
        let result = self.refresh(pool).await;

        match &result {
            Ok(snapshot) => info!(
                "Stats for {} ({}): price {:?}, liquidity {:?}",
                pool.display_symbol(),
                pool.key,
                snapshot.metrics.price_usd,
                snapshot.metrics.liquidity_usd
            ),
            Err(e) => warn!("Stats refresh for {} failed, keeping previous snapshot: {}", pool.key, e),
        }

        Some(result)
    }
}
