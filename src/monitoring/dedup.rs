use log::{debug, info, warn};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use crate::config::ColdStartPolicy;
use crate::db::{DbError, PoolRegistry};
use crate::models::{Cursor, Pool, PoolKey, Trade};
use crate::monitoring::dispatcher::{DispatchReport, Dispatcher};

/// Consecutive fetches without the cursor before it is re-anchored
pub const CURSOR_MISS_LIMIT: u32 = 3;

/// How a fetched batch related to the stored cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Nothing fetched
    Empty,
    /// No cursor yet; the whole batch is new
    ColdReplay,
    /// No cursor yet; the batch only sets the cursor
    ColdSeed,
    /// Cursor found; trades after it are new
    Resumed,
    /// Cursor pruned from the window; block numbers identified the new trades
    Watermark,
    /// Nothing newer than the cursor
    UpToDate,
    /// Cursor pruned and no way to tell which trades are new
    CursorMissed,
    /// Cursor missed too often; moved forward to the newest trade past it
    /// without dispatching
    Reanchored,
}

/// Pending work for one pool and one fetch
#[derive(Debug, Clone, PartialEq)]
pub struct BatchPlan {
    /// New trades, oldest first. Includes non-buys.
    pub pending: Vec<Trade>,
    /// Cursor to store once `pending` is processed, `None` to leave it
    pub next_cursor: Option<Cursor>,
    pub outcome: BatchOutcome,
}

impl BatchPlan {
    fn unchanged(outcome: BatchOutcome) -> Self {
        Self {
            pending: Vec::new(),
            next_cursor: None,
            outcome,
        }
    }
}

/// Drop id-less records and repeated ids, then put the batch newest first.
///
/// Feed order is trusted unless every trade carries a block number, in
/// which case a stable sort by block is applied.
fn prepare(fetched: Vec<Trade>) -> Vec<Trade> {
    let mut seen = HashSet::new();
    let mut trades: Vec<Trade> = fetched
        .into_iter()
        .filter(|t| !t.id.is_empty())
        .filter(|t| seen.insert(t.id.clone()))
        .collect();

    if trades.iter().all(|t| t.block_number.is_some()) {
        trades.sort_by_key(|t| Reverse(t.block_number));
    }
    trades
}

/// Work out which fetched trades are new relative to `last`.
///
/// `prior_misses` is how many fetches in a row have not contained the cursor.
pub fn plan_batch(
    last: Option<&Cursor>,
    fetched: Vec<Trade>,
    policy: ColdStartPolicy,
    prior_misses: u32,
) -> BatchPlan {
    let mut trades = prepare(fetched);
    let Some(newest) = trades.first() else {
        return BatchPlan::unchanged(BatchOutcome::Empty);
    };
    let newest_cursor = Cursor::new(newest.id.clone(), newest.block_number);

    let Some(last) = last else {
        return match policy {
            ColdStartPolicy::Replay => {
                trades.reverse();
                BatchPlan {
                    pending: trades,
                    next_cursor: Some(newest_cursor),
                    outcome: BatchOutcome::ColdReplay,
                }
            }
            ColdStartPolicy::Seed => BatchPlan {
                pending: Vec::new(),
                next_cursor: Some(newest_cursor),
                outcome: BatchOutcome::ColdSeed,
            },
        };
    };

    if let Some(position) = trades.iter().position(|t| t.id == last.trade_id) {
        if position == 0 {
            return BatchPlan::unchanged(BatchOutcome::UpToDate);
        }
        trades.truncate(position);
        trades.reverse();
        return BatchPlan {
            pending: trades,
            next_cursor: Some(newest_cursor),
            outcome: BatchOutcome::Resumed,
        };
    }

    let all_sequenced = trades.iter().all(|t| t.block_number.is_some());
    if let (Some(watermark), true) = (last.sequence, all_sequenced) {
        trades.retain(|t| t.block_number.map_or(false, |b| b > watermark));
        if trades.is_empty() {
            return BatchPlan::unchanged(BatchOutcome::UpToDate);
        }
        trades.reverse();
        return BatchPlan {
            pending: trades,
            next_cursor: Some(newest_cursor),
            outcome: BatchOutcome::Watermark,
        };
    }

    if prior_misses + 1 < CURSOR_MISS_LIMIT {
        return BatchPlan::unchanged(BatchOutcome::CursorMissed);
    }

    // A sequenced cursor only moves forward: onto the newest trade past it
    let anchor = match last.sequence {
        Some(watermark) => trades
            .iter()
            .find(|t| t.block_number.map_or(false, |b| b > watermark))
            .map(|t| Cursor::new(t.id.clone(), t.block_number)),
        None => Some(newest_cursor),
    };
    match anchor {
        Some(cursor) => BatchPlan {
            pending: Vec::new(),
            next_cursor: Some(cursor),
            outcome: BatchOutcome::Reanchored,
        },
        None => BatchPlan::unchanged(BatchOutcome::CursorMissed),
    }
}

/// Result of processing one pool in one cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolReport {
    pub outcome: BatchOutcome,
    pub new_trades: usize,
    pub buys: usize,
    pub delivery: DispatchReport,
    pub cursor_advanced: bool,
}

/// Turns fetched batches into ordered dispatches and cursor updates
pub struct Deduplicator {
    registry: Arc<dyn PoolRegistry>,
    dispatcher: Dispatcher,
    policy: ColdStartPolicy,
    misses: Mutex<HashMap<PoolKey, u32>>,
}

impl Deduplicator {
    pub fn new(registry: Arc<dyn PoolRegistry>, dispatcher: Dispatcher, policy: ColdStartPolicy) -> Self {
        Self {
            registry,
            dispatcher,
            policy,
            misses: Mutex::new(HashMap::new()),
        }
    }

    fn prior_misses(&self, key: &PoolKey) -> u32 {
        self.misses
            .lock()
            .map(|m| m.get(key).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn record_outcome(&self, key: &PoolKey, outcome: BatchOutcome) {
        if let Ok(mut misses) = self.misses.lock() {
            match outcome {
                BatchOutcome::CursorMissed => *misses.entry(key.clone()).or_insert(0) += 1,
                BatchOutcome::Empty => {}
                _ => {
                    misses.remove(key);
                }
            }
        }
    }

    /// Dispatch the new buys of `fetched` in causal order, then move the cursor.
    ///
    /// The cursor is only written after every pending trade has been handed
    /// to the dispatcher. A registry error aborts before that, so the batch
    /// is fetched again next cycle.
    pub async fn process_pool(&self, pool: &Pool, fetched: Vec<Trade>) -> Result<PoolReport, DbError> {
        let plan = plan_batch(
            pool.last_cursor.as_ref(),
            fetched,
            self.policy,
            self.prior_misses(&pool.key),
        );
        self.record_outcome(&pool.key, plan.outcome);

        match plan.outcome {
            BatchOutcome::CursorMissed => warn!(
                "Cursor for {} not in the fetched window, holding it",
                pool.key
            ),
            BatchOutcome::Reanchored => warn!(
                "Cursor for {} missing {} times in a row, re-anchoring without dispatch",
                pool.key, CURSOR_MISS_LIMIT
            ),
            BatchOutcome::ColdSeed => info!("Seeded cursor for {} without dispatching", pool.key),
            _ => {}
        }

        let mut report = PoolReport {
            outcome: plan.outcome,
            new_trades: plan.pending.len(),
            buys: 0,
            delivery: DispatchReport::default(),
            cursor_advanced: false,
        };

        let token_is_quote = pool.tracks_quote_side(self.dispatcher.native_symbol());
        for trade in &plan.pending {
            if !trade.is_buy_of(&pool.token_address, token_is_quote) {
                debug!("Skipping {:?} trade {} on {}", trade.direction, trade.id, pool.key);
                continue;
            }
            report.buys += 1;
            let delivery = self.dispatcher.dispatch(trade, pool).await?;
            report.delivery.merge(delivery);
        }

        if let Some(cursor) = &plan.next_cursor {
            self.registry.advance_cursor(&pool.key, cursor).await?;
            report.cursor_advanced = true;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_test_db, Database};
    use crate::models::TradeDirection;
    use crate::stats::StatsCache;
    use crate::test_support::{buy, sell, trade, tracked_pool, RecordingSender, StaticStats};
    use pretty_assertions::assert_eq;

    fn ids(trades: &[Trade]) -> Vec<&str> {
        trades.iter().map(|t| t.id.as_str()).collect()
    }

    fn scenario_batch() -> Vec<Trade> {
        vec![
            buy("t8", None),
            sell("t7", None),
            buy("t6", None),
            buy("t5", None),
        ]
    }

    fn deduplicator(db: &Arc<Database>, sender: Arc<RecordingSender>, policy: ColdStartPolicy) -> Deduplicator {
        let stats = StatsCache::new(db.clone(), Arc::new(StaticStats::default()));
        let dispatcher = Dispatcher::new(db.clone(), stats, sender, Default::default());
        Deduplicator::new(db.clone(), dispatcher, policy)
    }

    #[test]
    fn test_plan_resumes_after_cursor() {
        let last = Cursor::new("t5", None);
        let plan = plan_batch(Some(&last), scenario_batch(), ColdStartPolicy::Replay, 0);

        assert_eq!(plan.outcome, BatchOutcome::Resumed);
        assert_eq!(ids(&plan.pending), vec!["t6", "t7", "t8"]);
        assert_eq!(plan.next_cursor, Some(Cursor::new("t8", None)));
    }

    #[test]
    fn test_plan_cold_start_policies() {
        let replay = plan_batch(None, scenario_batch(), ColdStartPolicy::Replay, 0);
        assert_eq!(ids(&replay.pending), vec!["t5", "t6", "t7", "t8"]);
        assert_eq!(replay.next_cursor.unwrap().trade_id, "t8");

        let seed = plan_batch(None, scenario_batch(), ColdStartPolicy::Seed, 0);
        assert!(seed.pending.is_empty());
        assert_eq!(seed.outcome, BatchOutcome::ColdSeed);
        assert_eq!(seed.next_cursor.unwrap().trade_id, "t8");
    }

    #[test]
    fn test_plan_empty_and_up_to_date() {
        let last = Cursor::new("t8", None);
        assert_eq!(
            plan_batch(Some(&last), vec![], ColdStartPolicy::Replay, 0),
            BatchPlan::unchanged(BatchOutcome::Empty)
        );
        assert_eq!(
            plan_batch(Some(&last), scenario_batch(), ColdStartPolicy::Replay, 0),
            BatchPlan::unchanged(BatchOutcome::UpToDate)
        );
    }

    #[test]
    fn test_plan_pruned_cursor_uses_block_watermark() {
        let last = Cursor::new("t2", Some(102));
        let fetched = vec![buy("t5", Some(105)), buy("t4", Some(104)), buy("t3", Some(102))];
        let plan = plan_batch(Some(&last), fetched, ColdStartPolicy::Replay, 0);

        // t3 shares the cursor's block and is skipped
        assert_eq!(plan.outcome, BatchOutcome::Watermark);
        assert_eq!(ids(&plan.pending), vec!["t4", "t5"]);
        assert_eq!(plan.next_cursor, Some(Cursor::new("t5", Some(105))));

        let stale = vec![buy("t1", Some(100)), buy("t0", Some(99))];
        let plan = plan_batch(Some(&last), stale, ColdStartPolicy::Replay, 0);
        assert_eq!(plan, BatchPlan::unchanged(BatchOutcome::UpToDate));
    }

    #[test]
    fn test_plan_pruned_cursor_without_sequence_holds_then_reanchors() {
        let last = Cursor::new("gone", None);

        let plan = plan_batch(Some(&last), scenario_batch(), ColdStartPolicy::Replay, 0);
        assert_eq!(plan, BatchPlan::unchanged(BatchOutcome::CursorMissed));

        let plan = plan_batch(Some(&last), scenario_batch(), ColdStartPolicy::Replay, CURSOR_MISS_LIMIT - 1);
        assert_eq!(plan.outcome, BatchOutcome::Reanchored);
        assert!(plan.pending.is_empty());
        assert_eq!(plan.next_cursor.unwrap().trade_id, "t8");
    }

    #[test]
    fn test_plan_reanchor_never_moves_below_watermark() {
        let last = Cursor::new("t2", Some(102));
        let older = vec![buy("t1", Some(100)), buy("t0", None)];
        let plan = plan_batch(Some(&last), older, ColdStartPolicy::Replay, CURSOR_MISS_LIMIT - 1);
        assert_eq!(plan, BatchPlan::unchanged(BatchOutcome::CursorMissed));

        let mixed = vec![buy("t4", None), buy("t3", Some(103)), buy("t1", Some(100))];
        let plan = plan_batch(Some(&last), mixed, ColdStartPolicy::Replay, CURSOR_MISS_LIMIT - 1);
        assert_eq!(plan.outcome, BatchOutcome::Reanchored);
        assert!(plan.pending.is_empty());
        assert_eq!(plan.next_cursor, Some(Cursor::new("t3", Some(103))));
    }

    #[test]
    fn test_plan_drops_duplicates_and_blank_ids() {
        let fetched = vec![buy("t3", None), buy("", None), buy("t2", None), buy("t3", None), buy("t1", None)];
        let last = Cursor::new("t1", None);
        let plan = plan_batch(Some(&last), fetched, ColdStartPolicy::Replay, 0);

        assert_eq!(ids(&plan.pending), vec!["t2", "t3"]);
    }

    #[test]
    fn test_plan_sorts_by_block_when_available() {
        let fetched = vec![buy("b", Some(11)), buy("c", Some(12)), buy("a", Some(10))];
        let plan = plan_batch(None, fetched, ColdStartPolicy::Replay, 0);
        assert_eq!(ids(&plan.pending), vec!["a", "b", "c"]);
        assert_eq!(plan.next_cursor.unwrap().trade_id, "c");

        // one trade without a block: feed order is kept
        let fetched = vec![buy("b", Some(11)), buy("c", None), buy("a", Some(10))];
        let plan = plan_batch(None, fetched, ColdStartPolicy::Replay, 0);
        assert_eq!(ids(&plan.pending), vec!["a", "c", "b"]);
    }

    #[tokio::test]
    async fn test_scenario_dispatches_buys_in_order() {
        let db = Arc::new(init_test_db().await.unwrap());
        let mut pool = tracked_pool(&db, 1, "EQpool").await;
        pool.last_cursor = Some(Cursor::new("t5", None));

        let sender = Arc::new(RecordingSender::default());
        let dedup = deduplicator(&db, sender.clone(), ColdStartPolicy::Replay);
        let report = dedup.process_pool(&pool, scenario_batch()).await.unwrap();

        assert_eq!(report.new_trades, 3);
        assert_eq!(report.buys, 2);
        assert_eq!(report.delivery.delivered, 2);
        assert!(report.cursor_advanced);
        assert_eq!(sender.trade_ids(), vec!["t6", "t8"]);

        let stored = db.get_pool(&pool.key).await.unwrap().unwrap();
        assert_eq!(stored.last_cursor, Some(Cursor::new("t8", None)));
    }

    #[tokio::test]
    async fn test_rerun_with_same_cursor_is_idempotent() {
        let db = Arc::new(init_test_db().await.unwrap());
        let mut pool = tracked_pool(&db, 1, "EQpool").await;
        let sender = Arc::new(RecordingSender::default());
        let dedup = deduplicator(&db, sender.clone(), ColdStartPolicy::Replay);

        dedup.process_pool(&pool, scenario_batch()).await.unwrap();
        assert_eq!(sender.trade_ids(), vec!["t5", "t6", "t8"]);

        pool.last_cursor = db.get_pool(&pool.key).await.unwrap().unwrap().last_cursor;
        let report = dedup.process_pool(&pool, scenario_batch()).await.unwrap();
        assert_eq!(report.outcome, BatchOutcome::UpToDate);
        assert_eq!(sender.trade_ids().len(), 3);
    }

    #[tokio::test]
    async fn test_pruned_cursor_never_redispatches() {
        let db = Arc::new(init_test_db().await.unwrap());
        let mut pool = tracked_pool(&db, 1, "EQpool").await;
        pool.last_cursor = Some(Cursor::new("pruned", None));
        db.advance_cursor(&pool.key, pool.last_cursor.as_ref().unwrap()).await.unwrap();

        let sender = Arc::new(RecordingSender::default());
        let dedup = deduplicator(&db, sender.clone(), ColdStartPolicy::Replay);

        for _ in 0..CURSOR_MISS_LIMIT - 1 {
            let report = dedup.process_pool(&pool, scenario_batch()).await.unwrap();
            assert_eq!(report.outcome, BatchOutcome::CursorMissed);
            assert!(!report.cursor_advanced);
        }
        let report = dedup.process_pool(&pool, scenario_batch()).await.unwrap();
        assert_eq!(report.outcome, BatchOutcome::Reanchored);

        assert!(sender.sent().is_empty());
        let stored = db.get_pool(&pool.key).await.unwrap().unwrap();
        assert_eq!(stored.last_cursor.unwrap().trade_id, "t8");
    }

    #[tokio::test]
    async fn test_cursor_advances_despite_failed_delivery() {
        let db = Arc::new(init_test_db().await.unwrap());
        let pool = tracked_pool(&db, 1, "EQpool").await;
        let sender = Arc::new(RecordingSender::default());
        sender.fail_for(1);

        let dedup = deduplicator(&db, sender.clone(), ColdStartPolicy::Replay);
        let report = dedup
            .process_pool(&pool, vec![buy("t2", None), buy("t1", None)])
            .await
            .unwrap();

        assert_eq!(report.delivery.failed, 2);
        let stored = db.get_pool(&pool.key).await.unwrap().unwrap();
        assert_eq!(stored.last_cursor.unwrap().trade_id, "t2");
    }

    #[tokio::test]
    async fn test_unclassified_trades_use_received_token() {
        let db = Arc::new(init_test_db().await.unwrap());
        let pool = tracked_pool(&db, 1, "EQpool").await;

        let mut received = trade("t2", TradeDirection::Unclassified, None);
        received.received_token = Some(pool.token_address.to_uppercase());
        let mut spent = trade("t1", TradeDirection::Unclassified, None);
        spent.received_token = Some("EQsomething-else".to_string());

        let sender = Arc::new(RecordingSender::default());
        let dedup = deduplicator(&db, sender.clone(), ColdStartPolicy::Replay);
        let report = dedup.process_pool(&pool, vec![received, spent]).await.unwrap();

        assert_eq!(report.buys, 1);
        assert_eq!(sender.trade_ids(), vec!["t2"]);
    }

    #[tokio::test]
    async fn test_lagging_fetches_keep_sequenced_cursor() {
        let db = Arc::new(init_test_db().await.unwrap());
        let mut pool = tracked_pool(&db, 1, "EQpool").await;
        pool.last_cursor = Some(Cursor::new("t2", Some(102)));
        db.advance_cursor(&pool.key, pool.last_cursor.as_ref().unwrap()).await.unwrap();

        let sender = Arc::new(RecordingSender::default());
        let dedup = deduplicator(&db, sender.clone(), ColdStartPolicy::Replay);

        for _ in 0..CURSOR_MISS_LIMIT {
            let report = dedup
                .process_pool(&pool, vec![buy("t1", Some(100)), buy("t0", None)])
                .await
                .unwrap();
            assert_eq!(report.outcome, BatchOutcome::CursorMissed);
        }
        let stored = db.get_pool(&pool.key).await.unwrap().unwrap();
        assert_eq!(stored.last_cursor, Some(Cursor::new("t2", Some(102))));

        let fresh = vec![buy("t3", Some(103)), buy("t2", Some(102)), buy("t1", Some(100))];
        let report = dedup.process_pool(&stored, fresh).await.unwrap();
        assert_eq!(report.outcome, BatchOutcome::Resumed);
        assert_eq!(sender.trade_ids(), vec!["t3"]);
    }

    #[tokio::test]
    async fn test_quote_side_token_reads_received_token() {
        let db = Arc::new(init_test_db().await.unwrap());
        let mut pool = tracked_pool(&db, 1, "EQpool").await;
        pool.base_symbol = "TON".to_string();
        pool.quote_symbol = "DOGS".to_string();

        // labelled buys of the base asset: the trader received TON
        let mut sold_jetton = buy("t2", None);
        sold_jetton.received_token = Some("EQton".to_string());
        let mut bought_jetton = sell("t1", None);
        bought_jetton.received_token = Some(pool.token_address.clone());

        let sender = Arc::new(RecordingSender::default());
        let dedup = deduplicator(&db, sender.clone(), ColdStartPolicy::Replay);
        let report = dedup
            .process_pool(&pool, vec![sold_jetton, bought_jetton])
            .await
            .unwrap();
        assert_eq!(report.buys, 1);
        assert_eq!(sender.trade_ids(), vec!["t1"]);

        // without a received token the label flips
        pool.last_cursor = db.get_pool(&pool.key).await.unwrap().unwrap().last_cursor;
        let report = dedup
            .process_pool(&pool, vec![buy("t4", None), sell("t3", None), buy("t2", None)])
            .await
            .unwrap();
        assert_eq!(report.buys, 1);
        assert_eq!(sender.trade_ids(), vec!["t1", "t3"]);
    }
}
