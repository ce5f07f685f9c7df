//! Fakes and fixtures shared by the unit tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::db::{Database, DbError, PoolRegistry};
use crate::feeds::{FeedError, StatsSource, TradeFeed};
use crate::models::{Cursor, Pool, PoolKey, PoolMarketData, Subscription, Trade, TradeDirection};
use crate::monitoring::{MessageSender, Notification, SendError};

pub fn trade(id: &str, direction: TradeDirection, block: Option<u64>) -> Trade {
    let mut trade = Trade::new(id, direction);
    trade.base_amount = 1000.0;
    trade.quote_amount = 2.0;
    trade.volume_usd = 11.0;
    trade.trader = "EQtrader000000000001".to_string();
    trade.tx_hash = id.to_string();
    trade.block_number = block;
    trade
}

pub fn buy(id: &str, block: Option<u64>) -> Trade {
    trade(id, TradeDirection::Buy, block)
}

pub fn sell(id: &str, block: Option<u64>) -> Trade {
    trade(id, TradeDirection::Sell, block)
}

/// Register a pool on the `ton` network and subscribe `chat_id` to it
pub async fn tracked_pool(db: &Database, chat_id: i64, address: &str) -> Pool {
    let mut pool = Pool::new(PoolKey::new("ton", address));
    pool.token_address = format!("{}-token", address);
    pool.symbol = "DOGS".to_string();
    pool.quote_symbol = "TON".to_string();
    db.upsert_pool(&pool).await.unwrap();
    db.subscribe(chat_id, &pool.key, &pool.token_address).await.unwrap();
    db.get_pool(&pool.key).await.unwrap().unwrap()
}

/// Records every delivered notification; can fail or stall chosen chats
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(i64, Notification)>>,
    failing: Mutex<HashSet<i64>>,
    stalled: Mutex<HashMap<i64, Duration>>,
}

impl RecordingSender {
    pub fn fail_for(&self, chat_id: i64) {
        self.failing.lock().unwrap().insert(chat_id);
    }

    pub fn stall_for(&self, chat_id: i64, delay: Duration) {
        self.stalled.lock().unwrap().insert(chat_id, delay);
    }

    pub fn sent(&self) -> Vec<(i64, Notification)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn chats(&self) -> Vec<i64> {
        self.sent().into_iter().map(|(chat, _)| chat).collect()
    }

    /// Trade ids of delivered alerts, read back from their TX links
    pub fn trade_ids(&self) -> Vec<String> {
        const TX_PREFIX: &str = "https://tonviewer.com/transaction/";
        self.sent()
            .iter()
            .filter_map(|(_, n)| {
                let start = n.text.find(TX_PREFIX)? + TX_PREFIX.len();
                let rest = &n.text[start..];
                Some(rest[..rest.find('"')?].to_string())
            })
            .collect()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, chat_id: i64, notification: &Notification) -> Result<(), SendError> {
        if self.failing.lock().unwrap().contains(&chat_id) {
            return Err(SendError::Rejected {
                chat_id,
                reason: "chat not found".to_string(),
            });
        }
        let stall = self.stalled.lock().unwrap().get(&chat_id).copied();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
        self.sent.lock().unwrap().push((chat_id, notification.clone()));
        Ok(())
    }
}

/// Serves queued batches per pool, then empty batches
#[derive(Default)]
pub struct ScriptedFeed {
    batches: Mutex<HashMap<PoolKey, VecDeque<Vec<Trade>>>>,
    failing: Mutex<HashSet<PoolKey>>,
    calls: AtomicUsize,
}

impl ScriptedFeed {
    pub fn push(&self, key: &PoolKey, batch: Vec<Trade>) {
        self.batches
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_default()
            .push_back(batch);
    }

    pub fn fail(&self, key: &PoolKey) {
        self.failing.lock().unwrap().insert(key.clone());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TradeFeed for ScriptedFeed {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_recent_trades(&self, pool: &Pool, _limit: usize) -> Result<Vec<Trade>, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(&pool.key) {
            return Err(FeedError::Status {
                url: format!("scripted://{}", pool.key),
                status: 503,
            });
        }
        let next = self
            .batches
            .lock()
            .unwrap()
            .get_mut(&pool.key)
            .and_then(VecDeque::pop_front);
        Ok(next.unwrap_or_default())
    }
}

/// Returns the same market data for every pool, or fails on demand
#[derive(Default)]
pub struct StaticStats {
    data: Mutex<PoolMarketData>,
    failing: AtomicBool,
    calls: AtomicUsize,
}

impl StaticStats {
    pub fn new(data: PoolMarketData) -> Self {
        Self {
            data: Mutex::new(data),
            ..Default::default()
        }
    }

    pub fn set(&self, data: PoolMarketData) {
        *self.data.lock().unwrap() = data;
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatsSource for StaticStats {
    fn name(&self) -> &str {
        "static"
    }

    async fn market_data(&self, pool: &Pool) -> Result<PoolMarketData, FeedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(FeedError::NotFound(pool.key.to_string()));
        }
        Ok(self.data.lock().unwrap().clone())
    }
}

/// Database-backed registry whose cursor writes fail for chosen pools
pub struct CursorFailingRegistry {
    inner: Arc<Database>,
    failing: Mutex<HashSet<PoolKey>>,
}

impl CursorFailingRegistry {
    pub fn new(inner: Arc<Database>) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_for(&self, key: &PoolKey) {
        self.failing.lock().unwrap().insert(key.clone());
    }
}

#[async_trait]
impl PoolRegistry for CursorFailingRegistry {
    async fn list_tracked_pools(&self) -> Result<Vec<Pool>, DbError> {
        self.inner.list_tracked_pools().await
    }

    async fn advance_cursor(&self, pool: &PoolKey, cursor: &Cursor) -> Result<(), DbError> {
        if self.failing.lock().unwrap().contains(pool) {
            return Err(DbError::Sqlx(sqlx::Error::PoolClosed));
        }
        self.inner.advance_cursor(pool, cursor).await
    }

    async fn list_destinations(&self, pool: &PoolKey) -> Result<Vec<Subscription>, DbError> {
        self.inner.list_destinations(pool).await
    }
}
