//! Pool statistics: a per-pool cached snapshot refreshed on its own cadence,
//! read without blocking by the alert path.

mod cache;
mod fallback;

pub use cache::StatsCache;
pub use fallback::FallbackStats;

use thiserror::Error;

use crate::db::DbError;
use crate::feeds::FeedError;

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("Stats source failed: {0}")]
    Source(#[from] FeedError),
    #[error("Stats store failed: {0}")]
    Store(#[from] DbError),
    #[error("Stats source returned no metrics for {0}")]
    Empty(String),
}
