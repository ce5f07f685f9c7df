use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a tracked pool: network slug plus pool address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolKey {
    pub network: String,
    pub address: String,
}

impl PoolKey {
    pub fn new(network: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            address: address.into(),
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.address)
    }
}

/// Marker of the most recently processed trade for a pool.
///
/// `sequence` is the feed's block number for that trade when the feed
/// provides one. It acts as a watermark once the trade id itself has
/// dropped out of the feed window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub trade_id: String,
    pub sequence: Option<u64>,
}

impl Cursor {
    pub fn new(trade_id: impl Into<String>, sequence: Option<u64>) -> Self {
        Self {
            trade_id: trade_id.into(),
            sequence,
        }
    }
}

/// Represents a tracked DEX liquidity pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub key: PoolKey,
    /// Contract address of the tracked token
    pub token_address: String,
    pub symbol: String,
    pub name: String,
    pub base_symbol: String,
    pub quote_symbol: String,
    /// Community link (usually a Telegram group)
    pub social_url: Option<String>,
    /// Override for the GeckoTerminal link
    pub explorer_url: Option<String>,
    /// Override for the DexScreener link
    pub chart_url: Option<String>,
    pub last_cursor: Option<Cursor>,
}

impl Pool {
    pub fn new(key: PoolKey) -> Self {
        Self {
            key,
            token_address: String::new(),
            symbol: String::new(),
            name: String::new(),
            base_symbol: String::new(),
            quote_symbol: String::new(),
            social_url: None,
            explorer_url: None,
            chart_url: None,
            last_cursor: None,
        }
    }

    /// Symbol shown in alerts, falling back to the base asset and then a placeholder
    pub fn display_symbol(&self) -> &str {
        if !self.symbol.is_empty() {
            &self.symbol
        } else if !self.base_symbol.is_empty() {
            &self.base_symbol
        } else {
            "TOKEN"
        }
    }

    /// Whether the tracked token sits on the quote side, i.e. the pool is
    /// quoted with the native coin as its base asset.
    pub fn tracks_quote_side(&self, native_symbol: &str) -> bool {
        self.base_symbol.eq_ignore_ascii_case(native_symbol)
            && !self.quote_symbol.eq_ignore_ascii_case(native_symbol)
    }
}
