use async_trait::async_trait;
use log::info;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SendError {
    #[error("Delivery to {chat_id} timed out")]
    Timeout { chat_id: i64 },
    #[error("Chat {chat_id} rejected the message: {reason}")]
    Rejected { chat_id: i64, reason: String },
    #[error("Transport error: {0}")]
    Transport(String),
}

/// A button under a message that opens a URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkButton {
    pub label: String,
    pub url: String,
}

impl LinkButton {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            url: url.into(),
        }
    }
}

/// A rendered alert ready for delivery. `text` is Telegram HTML.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub text: String,
    /// Buttons shown on a single row, in order
    pub links: Vec<LinkButton>,
}

/// Delivers notifications to chats
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, chat_id: i64, notification: &Notification) -> Result<(), SendError>;
}

/// Writes alerts to the log instead of a chat. Used for dry runs.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl MessageSender for LogNotifier {
    async fn send(&self, chat_id: i64, notification: &Notification) -> Result<(), SendError> {
        let buttons: Vec<&str> = notification.links.iter().map(|b| b.label.as_str()).collect();
        info!(
            "[dry-run] chat {}:\n{}\nbuttons: {:?}",
            chat_id, notification.text, buttons
        );
        Ok(())
    }
}
