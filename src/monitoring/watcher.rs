use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::db::{DbError, PoolRegistry};
use crate::feeds::TradeFeed;
use crate::monitoring::dedup::Deduplicator;
use crate::stats::StatsCache;

/// Lifecycle of the polling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Polling,
    /// Stop requested; the running iteration completes first
    Stopping,
    Stopped,
}

/// Totals for one pass over all tracked pools
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleSummary {
    pub pools: usize,
    pub feed_errors: usize,
    /// Pools whose batch hit a storage error; their cursors are untouched
    pub pool_errors: usize,
    pub new_trades: usize,
    pub buys: usize,
    pub delivered: usize,
    pub failed: usize,
    pub stats_refreshed: bool,
}

/// Polls every tracked pool on a fixed interval and refreshes stats on a
/// slower one, until told to stop.
pub struct Watcher {
    registry: Arc<dyn PoolRegistry>,
    feed: Arc<dyn TradeFeed>,
    dedup: Deduplicator,
    stats: StatsCache,
    trades_limit: usize,
    poll_interval: Duration,
    stats_interval: Duration,
    last_stats_refresh: Option<Instant>,
    state: WatcherState,
    stop: watch::Receiver<bool>,
}

impl Watcher {
    pub fn new(
        registry: Arc<dyn PoolRegistry>,
        feed: Arc<dyn TradeFeed>,
        dedup: Deduplicator,
        stats: StatsCache,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry,
            feed,
            dedup,
            stats,
            trades_limit: 12,
            poll_interval: Duration::from_secs(12),
            stats_interval: Duration::from_secs(180),
            last_stats_refresh: None,
            state: WatcherState::Polling,
            stop,
        }
    }

    pub fn with_intervals(mut self, poll: Duration, stats: Duration) -> Self {
        self.poll_interval = poll;
        self.stats_interval = stats;
        self
    }

    pub fn with_trades_limit(mut self, limit: usize) -> Self {
        self.trades_limit = limit;
        self
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }

    /// Run until a stop is signalled. Iterations are never cut short; only
    /// the sleep between them is.
    pub async fn run(mut self) -> WatcherState {
        info!(
            "Watcher started: poll every {:?}, stats every {:?}, {} trades per fetch",
            self.poll_interval, self.stats_interval, self.trades_limit
        );

        while self.state == WatcherState::Polling {
            if self.stop_requested() {
                self.state = WatcherState::Stopping;
                break;
            }

            match self.run_iteration().await {
                Ok(summary) if summary.pools > 0 => debug!("Cycle done: {:?}", summary),
                Ok(_) => debug!("No tracked pools, waiting"),
                Err(e) => error!("Cycle aborted: {}", e),
            }

            if self.stop_requested() {
                self.state = WatcherState::Stopping;
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {}
                changed = self.stop.changed() => {
                    // a dropped sender also means stop
                    if changed.is_err() || *self.stop.borrow() {
                        self.state = WatcherState::Stopping;
                    }
                }
            }
        }

        info!("Watcher stopping");
        self.state = WatcherState::Stopped;
        self.state
    }

    fn stats_due(&self) -> bool {
        self.last_stats_refresh
            .map_or(true, |at| at.elapsed() >= self.stats_interval)
    }

    /// One pass: maybe refresh stats for one pool, then process every pool.
    ///
    /// Feed failures count as empty fetches. A registry failure on one pool
    /// leaves that pool's cursor untouched and moves on to the next; only
    /// failing to list the pools ends the pass.
    pub async fn run_iteration(&mut self) -> Result<CycleSummary, DbError> {
        let pools = self.registry.list_tracked_pools().await?;
        let mut summary = CycleSummary {
            pools: pools.len(),
            ..Default::default()
        };
        if pools.is_empty() {
            return Ok(summary);
        }

        if self.stats_due() {
            self.last_stats_refresh = Some(Instant::now());
            summary.stats_refreshed = matches!(self.stats.refresh_next(&pools).await, Some(Ok(_)));
        }

        for pool in &pools {
            let fetched = match self.feed.fetch_recent_trades(pool, self.trades_limit).await {
                Ok(trades) => trades,
                Err(e) => {
                    warn!("{} fetch failed for {}: {}", self.feed.name(), pool.key, e);
                    summary.feed_errors += 1;
                    Vec::new()
                }
            };

            let report = match self.dedup.process_pool(pool, fetched).await {
                Ok(report) => report,
                Err(e) => {
                    error!("Batch for {} aborted, cursor kept: {}", pool.key, e);
                    summary.pool_errors += 1;
                    continue;
                }
            };
            summary.new_trades += report.new_trades;
            summary.buys += report.buys;
            summary.delivered += report.delivery.delivered;
            summary.failed += report.delivery.failed;
        }

        if summary.buys > 0 {
            info!(
                "Cycle: {} pools, {} new trades, {} buys, {} delivered, {} failed",
                summary.pools, summary.new_trades, summary.buys, summary.delivered, summary.failed
            );
        }
        Ok(summary)
    }
}
