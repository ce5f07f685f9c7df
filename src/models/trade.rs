use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction of a trade relative to the pool's base token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeDirection {
    Buy,
    Sell,
    /// The feed did not say
    Unclassified,
}

impl TradeDirection {
    /// Parse a feed's free-form direction label
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "buy" => TradeDirection::Buy,
            "sell" => TradeDirection::Sell,
            _ => TradeDirection::Unclassified,
        }
    }
}

/// A single swap as reported by a trade feed, after normalization.
///
/// Trades are never persisted; only the cursor they produce is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub direction: TradeDirection,
    pub base_amount: f64,
    pub quote_amount: f64,
    pub volume_usd: f64,
    pub trader: String,
    pub tx_hash: String,
    pub block_number: Option<u64>,
    pub block_timestamp: Option<DateTime<Utc>>,
    /// Address of the token the trader received, when the feed reports it
    pub received_token: Option<String>,
}

impl Trade {
    pub fn new(id: impl Into<String>, direction: TradeDirection) -> Self {
        Self {
            id: id.into(),
            direction,
            base_amount: 0.0,
            quote_amount: 0.0,
            volume_usd: 0.0,
            trader: String::new(),
            tx_hash: String::new(),
            block_number: None,
            block_timestamp: None,
            received_token: None,
        }
    }

    /// Whether this trade is a purchase of `token_address`.
    ///
    /// The received token decides when the feed reports it. Otherwise the
    /// feed's label is read from the base side of the pool, so it flips when
    /// the tracked token is the quote asset. Unlabelled trades without a
    /// received token are never buys.
    pub fn is_buy_of(&self, token_address: &str, token_is_quote: bool) -> bool {
        if let Some(received) = self.received_token.as_deref().filter(|r| !r.is_empty()) {
            if !token_address.is_empty() {
                return received.eq_ignore_ascii_case(token_address);
            }
        }
        match self.direction {
            TradeDirection::Buy => !token_is_quote,
            TradeDirection::Sell => token_is_quote,
            TradeDirection::Unclassified => false,
        }
    }
}
