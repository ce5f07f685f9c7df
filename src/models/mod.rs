pub mod pool;
mod stats;
mod subscription;
mod trade;

pub use pool::{Cursor, Pool, PoolKey};
pub use stats::{PoolMarketData, PoolMetrics, StatsSnapshot};
pub use subscription::{DisplayConfig, Subscription};
pub use trade::{Trade, TradeDirection};
