pub mod dedup;
pub mod dispatcher;
pub mod notifier;
#[cfg(feature = "telegram")]
mod telegram;
pub mod watcher;

pub use dedup::{plan_batch, BatchOutcome, BatchPlan, Deduplicator, PoolReport};
pub use dispatcher::{DispatchReport, Dispatcher};
pub use notifier::{LinkButton, LogNotifier, MessageSender, Notification, SendError};
pub use watcher::{CycleSummary, Watcher, WatcherState};

#[cfg(feature = "telegram")]
pub use telegram::TelegramSender;
