use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

use crate::db::{DbError, PoolRegistry};
use crate::models::{DisplayConfig, Pool, StatsSnapshot, Trade};
use crate::monitoring::notifier::{LinkButton, MessageSender, Notification, SendError};
use crate::stats::StatsCache;
use crate::utils::format::telegram_handle_url;
use crate::utils::{format_buy_message, BuyMessage};

/// Delivery outcome of one trade across all its destinations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
}

impl DispatchReport {
    pub fn merge(&mut self, other: DispatchReport) {
        self.delivered += other.delivered;
        self.failed += other.failed;
    }
}

/// Fans a qualifying buy out to every destination subscribed to its pool
pub struct Dispatcher {
    registry: Arc<dyn PoolRegistry>,
    stats: StatsCache,
    sender: Arc<dyn MessageSender>,
    defaults: DisplayConfig,
    aggregate_chat: Option<i64>,
    native_symbol: String,
    send_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<dyn PoolRegistry>,
        stats: StatsCache,
        sender: Arc<dyn MessageSender>,
        defaults: DisplayConfig,
    ) -> Self {
        Self {
            registry,
            stats,
            sender,
            defaults,
            aggregate_chat: None,
            native_symbol: "TON".to_string(),
            send_timeout: Duration::from_secs(15),
        }
    }

    /// Channel that receives a copy of every buy, with default display settings
    pub fn with_aggregate_chat(mut self, chat_id: Option<i64>) -> Self {
        self.aggregate_chat = chat_id;
        self
    }

    pub fn with_native_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.native_symbol = symbol.into();
        self
    }

    pub fn native_symbol(&self) -> &str {
        &self.native_symbol
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Notify every destination of `trade`.
    ///
    /// Send failures are counted, never returned. Only a registry failure
    /// aborts, since then the destinations are unknown.
    pub async fn dispatch(&self, trade: &Trade, pool: &Pool) -> Result<DispatchReport, DbError> {
        let destinations = self.registry.list_destinations(&pool.key).await?;
        let snapshot = self.stats.get(pool).await;
        let message = self.compose(trade, pool, snapshot.as_ref());

        let mut targets: Vec<(i64, DisplayConfig)> = destinations
            .into_iter()
            .map(|sub| (sub.chat_id, sub.display.resolve(&self.defaults)))
            .collect();
        if let Some(chat_id) = self.aggregate_chat {
            targets.push((chat_id, self.defaults.clone()));
        }

        let mut report = DispatchReport::default();
        for (chat_id, display) in targets {
            let notification = self.render(&message, pool, &display);
            match self.deliver(chat_id, &notification).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!("Failed to deliver buy {} to chat {}: {}", trade.id, chat_id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Buy {} on {} ({}): {} delivered, {} failed",
            trade.id,
            pool.display_symbol(),
            pool.key,
            report.delivered,
            report.failed
        );
        Ok(report)
    }

    async fn deliver(&self, chat_id: i64, notification: &Notification) -> Result<(), SendError> {
        match tokio::time::timeout(self.send_timeout, self.sender.send(chat_id, notification)).await {
            Ok(result) => result,
            Err(_) => Err(SendError::Timeout { chat_id }),
        }
    }

    /// Destination-independent part of the alert
    fn compose(&self, trade: &Trade, pool: &Pool, snapshot: Option<&StatsSnapshot>) -> BuyMessage {
        let (native_amount, token_amount) = self.split_amounts(trade, pool);
        let network = &pool.key.network;
        let address = &pool.key.address;
        let metrics = snapshot.map(|s| s.metrics.clone()).unwrap_or_default();

        BuyMessage {
            symbol: pool.display_symbol().to_string(),
            native_symbol: self.native_symbol.clone(),
            native_amount,
            usd_value: trade.volume_usd,
            token_amount,
            buyer: trade.trader.clone(),
            price_usd: metrics.price_usd,
            liquidity_usd: metrics.liquidity_usd,
            market_cap_usd: metrics.market_cap_usd.or(metrics.fdv_usd),
            holders: metrics.holders,
            price_change_24h: metrics.price_change_24h,
            tx_url: if trade.tx_hash.is_empty() {
                String::new()
            } else {
                format!("https://tonviewer.com/transaction/{}", trade.tx_hash)
            },
            explorer_url: non_empty(pool.explorer_url.as_deref())
                .unwrap_or_else(|| format!("https://www.geckoterminal.com/{}/pools/{}", network, address)),
            chart_url: non_empty(pool.chart_url.as_deref())
                .unwrap_or_else(|| format!("https://dexscreener.com/{}/{}", network, address)),
            social_url: pool
                .social_url
                .as_deref()
                .and_then(telegram_handle_url)
                .unwrap_or_default(),
            trending_url: String::new(),
        }
    }

    /// Spent native coin and received token amount.
    ///
    /// The native side is the quote asset unless the pool is quoted the
    /// other way round.
    fn split_amounts(&self, trade: &Trade, pool: &Pool) -> (f64, f64) {
        let base = trade.base_amount.abs();
        let quote = trade.quote_amount.abs();

        if pool.tracks_quote_side(&self.native_symbol) {
            (base, quote)
        } else {
            (quote, base)
        }
    }

    fn render(&self, message: &BuyMessage, pool: &Pool, display: &DisplayConfig) -> Notification {
        let mut message = message.clone();
        message.trending_url = display.trending_url.clone();

        let mut links = Vec::new();
        if !display.book_trend_url.is_empty() {
            links.push(LinkButton::new("Book Trend", display.book_trend_url.as_str()));
        }
        if !display.trending_url.is_empty() {
            links.push(LinkButton::new("Trending", display.trending_url.as_str()));
        }
        if !display.dtrade_ref.is_empty() && !pool.token_address.is_empty() {
            links.push(LinkButton::new(
                "Buy with dTrade",
                format!("https://t.me/dtrade?start={}_{}", display.dtrade_ref, pool.token_address),
            ));
        }

        Notification {
            text: format_buy_message(&message),
            links,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_test_db, Database, StatsStore};
    use crate::models::{PoolMetrics, TradeDirection};
    use crate::test_support::{buy, tracked_pool, RecordingSender, StaticStats};
    use pretty_assertions::assert_eq;

    fn defaults() -> DisplayConfig {
        DisplayConfig {
            book_trend_url: "https://t.me/book".to_string(),
            trending_url: "https://t.me/trending".to_string(),
            dtrade_ref: "REF".to_string(),
        }
    }

    fn dispatcher(db: &Arc<Database>, sender: Arc<RecordingSender>) -> Dispatcher {
        let stats = StatsCache::new(db.clone(), Arc::new(StaticStats::default()));
        Dispatcher::new(db.clone(), stats, sender, defaults())
    }

    #[tokio::test]
    async fn test_one_failing_destination_does_not_block_others() {
        let db = Arc::new(init_test_db().await.unwrap());
        let pool = tracked_pool(&db, 1, "EQpool").await;
        db.subscribe(2, &pool.key, &pool.token_address).await.unwrap();
        db.subscribe(3, &pool.key, &pool.token_address).await.unwrap();

        let sender = Arc::new(RecordingSender::default());
        sender.fail_for(2);
        let report = dispatcher(&db, sender.clone())
            .dispatch(&buy("t1", Some(10)), &pool)
            .await
            .unwrap();

        assert_eq!(report, DispatchReport { delivered: 2, failed: 1 });
        assert_eq!(sender.chats(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_slow_destination_times_out() {
        let db = Arc::new(init_test_db().await.unwrap());
        let pool = tracked_pool(&db, 1, "EQpool").await;
        db.subscribe(2, &pool.key, &pool.token_address).await.unwrap();

        let sender = Arc::new(RecordingSender::default());
        sender.stall_for(1, Duration::from_secs(5));
        let report = dispatcher(&db, sender.clone())
            .with_send_timeout(Duration::from_millis(20))
            .dispatch(&buy("t1", None), &pool)
            .await
            .unwrap();

        assert_eq!(report, DispatchReport { delivered: 1, failed: 1 });
        assert_eq!(sender.chats(), vec![2]);
    }

    #[tokio::test]
    async fn test_aggregate_chat_gets_defaults() {
        let db = Arc::new(init_test_db().await.unwrap());
        let pool = tracked_pool(&db, 1, "EQpool").await;
        db.set_group_links(1, "https://t.me/own-book", "").await.unwrap();

        let sender = Arc::new(RecordingSender::default());
        let report = dispatcher(&db, sender.clone())
            .with_aggregate_chat(Some(-100))
            .dispatch(&buy("t1", None), &pool)
            .await
            .unwrap();
        assert_eq!(report.delivered, 2);

        let sent = sender.sent();
        assert_eq!(sent[0].0, 1);
        assert_eq!(sent[0].1.links[0], LinkButton::new("Book Trend", "https://t.me/own-book"));
        assert_eq!(sent[1].0, -100);
        assert_eq!(sent[1].1.links[0], LinkButton::new("Book Trend", "https://t.me/book"));
        assert_eq!(
            sent[1].1.links[2].url,
            format!("https://t.me/dtrade?start=REF_{}", pool.token_address)
        );
    }

    #[tokio::test]
    async fn test_message_uses_snapshot_and_native_side() {
        let db = Arc::new(init_test_db().await.unwrap());
        let mut pool = tracked_pool(&db, 1, "EQpool").await;
        pool.base_symbol = "TON".to_string();
        pool.quote_symbol = "USDT".to_string();
        db.put_stats(
            &pool.key,
            &PoolMetrics {
                price_usd: Some(5.5),
                fdv_usd: Some(2_000_000.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let mut trade = Trade::new("t1", TradeDirection::Buy);
        trade.base_amount = 3.0;
        trade.quote_amount = 16.5;
        trade.volume_usd = 16.5;
        trade.tx_hash = "abc".to_string();

        let sender = Arc::new(RecordingSender::default());
        dispatcher(&db, sender.clone()).dispatch(&trade, &pool).await.unwrap();

        let text = &sender.sent()[0].1.text;
        assert!(text.contains("<b>3.00 TON</b> ($16.50)"));
        assert!(text.contains("Price: $5.5000"));
        assert!(text.contains("MCap: $2.00M"));
        assert!(text.contains("https://tonviewer.com/transaction/abc"));
        assert!(text.contains("https://www.geckoterminal.com/ton/pools/EQpool"));
    }

    #[tokio::test]
    async fn test_no_destinations() {
        let db = Arc::new(init_test_db().await.unwrap());
        let mut pool = Pool::new(crate::models::PoolKey::new("ton", "EQorphan"));
        pool.token_address = "EQtoken".to_string();
        db.upsert_pool(&pool).await.unwrap();

        let sender = Arc::new(RecordingSender::default());
        let report = dispatcher(&db, sender.clone()).dispatch(&buy("t1", None), &pool).await.unwrap();
        assert_eq!(report, DispatchReport::default());
        assert!(sender.sent().is_empty());
    }
}
