use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

use crate::models::DisplayConfig;

const MIN_POLL_SECONDS: u64 = 5;
const MIN_STATS_REFRESH_SECONDS: u64 = 60;
const DEFAULT_DTRADE_REF: &str = "11TYq7LInG";

/// What to do with the first batch of a pool that has no cursor yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColdStartPolicy {
    /// Dispatch every buy in the first batch
    Replay,
    /// Record the newest trade as the cursor without dispatching
    Seed,
}

impl FromStr for ColdStartPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replay" => Ok(ColdStartPolicy::Replay),
            "seed" => Ok(ColdStartPolicy::Seed),
            other => Err(anyhow!("unknown cold start policy '{}' (expected replay or seed)", other)),
        }
    }
}

/// Configuration for the buy alert bot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Telegram bot token, required for live delivery
    pub bot_token: Option<String>,
    /// SQLite database path or `sqlite:` URL
    pub database_path: String,
    /// GeckoTerminal network slug
    pub network: String,
    /// Symbol of the chain's native coin, shown as the spend amount
    pub native_symbol: String,
    /// Seconds between trade polling cycles
    pub poll_seconds: u64,
    /// Seconds between pool stats refreshes
    pub stats_refresh_seconds: u64,
    /// Number of recent trades requested per pool and cycle
    pub trades_limit: usize,
    /// Ceiling for each HTTP request to a data API
    pub http_timeout_seconds: u64,
    /// Ceiling for each message delivery
    pub send_timeout_seconds: u64,
    /// Optional channel that receives a copy of every buy
    pub aggregate_chat_id: Option<i64>,
    /// Display defaults for destinations that did not set their own
    pub defaults: DisplayConfig,
    pub cold_start: ColdStartPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bot_token: None,
            database_path: "buybot.db".to_string(),
            network: "ton".to_string(),
            native_symbol: "TON".to_string(),
            poll_seconds: 12,
            stats_refresh_seconds: 180,
            trades_limit: 12,
            http_timeout_seconds: 20,
            send_timeout_seconds: 15,
            aggregate_chat_id: None,
            defaults: DisplayConfig {
                book_trend_url: String::new(),
                trending_url: String::new(),
                dtrade_ref: DEFAULT_DTRADE_REF.to_string(),
            },
            cold_start: ColdStartPolicy::Replay,
        }
    }
}

impl Config {
    /// Build a configuration from a variable lookup, falling back to default values
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config = Config::default();

        config.bot_token = get("BOT_TOKEN");

        if let Some(path) = get("DATABASE_PATH") {
            config.database_path = path;
        }

        if let Some(network) = get("NETWORK") {
            config.network = network.to_ascii_lowercase();
        }

        if let Some(symbol) = get("NATIVE_SYMBOL") {
            config.native_symbol = symbol;
        }

        if let Some(value) = get("POLL_SECONDS").and_then(|v| v.parse::<u64>().ok()) {
            config.poll_seconds = value;
        }
        config.poll_seconds = config.poll_seconds.max(MIN_POLL_SECONDS);

        if let Some(value) = get("STATS_REFRESH_SECONDS").and_then(|v| v.parse::<u64>().ok()) {
            config.stats_refresh_seconds = value;
        }
        config.stats_refresh_seconds = config.stats_refresh_seconds.max(MIN_STATS_REFRESH_SECONDS);

        if let Some(value) = get("TRADES_LIMIT").and_then(|v| v.parse::<usize>().ok()) {
            config.trades_limit = value.clamp(1, 100);
        }

        if let Some(value) = get("HTTP_TIMEOUT_SECONDS").and_then(|v| v.parse::<u64>().ok()) {
            config.http_timeout_seconds = value.max(1);
        }

        if let Some(value) = get("SEND_TIMEOUT_SECONDS").and_then(|v| v.parse::<u64>().ok()) {
            config.send_timeout_seconds = value.max(1);
        }

        // POST_CHAT_ID is the older name of the same setting
        config.aggregate_chat_id = get("TRENDING_POST_CHAT_ID")
            .and_then(|v| v.parse::<i64>().ok())
            .filter(|id| *id != 0)
            .or_else(|| {
                get("POST_CHAT_ID")
                    .and_then(|v| v.parse::<i64>().ok())
                    .filter(|id| *id != 0)
            });

        if let Some(url) = get("BOOK_TREND_URL") {
            config.defaults.book_trend_url = url;
        }

        if let Some(url) = get("TRENDING_URL") {
            config.defaults.trending_url = url;
        }

        if let Some(code) = get("DTRADE_REF").or_else(|| get("DTREDE_REF")) {
            config.defaults.dtrade_ref = code;
        }

        if let Some(policy) = get("COLD_START") {
            config.cold_start = policy.parse()?;
        }

        Ok(config)
    }

    /// The bot token, or an error if live delivery cannot start
    pub fn require_bot_token(&self) -> Result<&str> {
        self.bot_token
            .as_deref()
            .ok_or_else(|| anyhow!("BOT_TOKEN is missing"))
    }
}

/// Loads configuration from environment variables, falling back to default values
pub fn load_config() -> Result<Config> {
    Config::from_lookup(|name| env::var(name).ok())
}
