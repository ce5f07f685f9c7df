use async_trait::async_trait;
use log::debug;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};
use teloxide::RequestError;

use crate::monitoring::notifier::{MessageSender, Notification, SendError};

/// Delivers alerts through the Telegram Bot API
pub struct TelegramSender {
    bot: Bot,
}

impl TelegramSender {
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }
}

/// All URL buttons on a single row. Buttons with unparsable URLs are left out.
fn keyboard(notification: &Notification) -> Option<InlineKeyboardMarkup> {
    let row: Vec<InlineKeyboardButton> = notification
        .links
        .iter()
        .filter_map(|link| match reqwest::Url::parse(&link.url) {
            Ok(url) => Some(InlineKeyboardButton::url(link.label.clone(), url)),
            Err(e) => {
                debug!("Skipping button {} with bad URL {}: {}", link.label, link.url, e);
                None
            }
        })
        .collect();

    if row.is_empty() {
        None
    } else {
        Some(InlineKeyboardMarkup::new(vec![row]))
    }
}

#[async_trait]
impl MessageSender for TelegramSender {
    async fn send(&self, chat_id: i64, notification: &Notification) -> Result<(), SendError> {
        let mut request = self
            .bot
            .send_message(ChatId(chat_id), notification.text.clone())
            .parse_mode(ParseMode::Html)
            .disable_web_page_preview(true);
        if let Some(markup) = keyboard(notification) {
            request = request.reply_markup(markup);
        }

        match request.await {
            Ok(_) => Ok(()),
            Err(RequestError::Api(api)) => Err(SendError::Rejected {
                chat_id,
                reason: api.to_string(),
            }),
            Err(e) => Err(SendError::Transport(e.to_string())),
        }
    }
}
