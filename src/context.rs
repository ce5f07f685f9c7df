use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::Config;
use crate::db::Database;
use crate::feeds::{DexScreener, GeckoTerminal, HttpClient};
use crate::monitoring::{Deduplicator, Dispatcher, MessageSender, Watcher};
use crate::stats::{FallbackStats, StatsCache};

/// Everything the bot needs, built once at startup and passed explicitly
pub struct AppContext {
    pub config: Config,
    pub db: Arc<Database>,
    pub gecko: GeckoTerminal,
    pub stats: StatsCache,
}

impl AppContext {
    pub fn new(config: Config, db: Database) -> Result<Self> {
        let http = HttpClient::new(Duration::from_secs(config.http_timeout_seconds))
            .context("Failed to build HTTP client")?;
        let gecko = GeckoTerminal::new(http.clone());
        let dexscreener = DexScreener::new(http);

        let db = Arc::new(db);
        let source = FallbackStats::new(Arc::new(gecko.clone()), Arc::new(dexscreener));
        let stats = StatsCache::new(db.clone(), Arc::new(source));

        Ok(Self {
            config,
            db,
            gecko,
            stats,
        })
    }

    /// Wire the polling loop around `sender`
    pub fn watcher(&self, sender: Arc<dyn MessageSender>, stop: watch::Receiver<bool>) -> Watcher {
        let config = &self.config;

        let dispatcher = Dispatcher::new(
            self.db.clone(),
            self.stats.clone(),
            sender,
            config.defaults.clone(),
        )
        .with_aggregate_chat(config.aggregate_chat_id)
        .with_native_symbol(config.native_symbol.clone())
        .with_send_timeout(Duration::from_secs(config.send_timeout_seconds));

        let dedup = Deduplicator::new(self.db.clone(), dispatcher, config.cold_start);

        Watcher::new(
            self.db.clone(),
            Arc::new(self.gecko.clone()),
            dedup,
            self.stats.clone(),
            stop,
        )
        .with_intervals(
            Duration::from_secs(config.poll_seconds),
            Duration::from_secs(config.stats_refresh_seconds),
        )
        .with_trades_limit(config.trades_limit)
    }
}
