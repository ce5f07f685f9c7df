use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::debug;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::feeds::{FeedError, HttpClient, NormalizeTrade, StatsSource, TradeFeed};
use crate::models::{Pool, PoolMarketData, PoolMetrics, Trade, TradeDirection};
use crate::utils::convert::{value_to_f64, value_to_u64};
use crate::utils::{lenient_f64, lenient_u64, strip_network_prefix};

pub const GECKO_API: &str = "https://api.geckoterminal.com/api/v2";

#[derive(Debug, Deserialize)]
struct GeckoList<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    #[serde(default)]
    included: Vec<GeckoIncluded>,
}

#[derive(Debug, Deserialize)]
struct GeckoDocument<T> {
    data: T,
    #[serde(default)]
    included: Vec<GeckoIncluded>,
}

/// Trade record from `/pools/{address}/trades`.
///
/// Attributes are kept as a loose map: field names differ between API
/// revisions and networks, and the normalizer picks the first one present.
#[derive(Debug, Clone, Deserialize)]
pub struct GeckoTrade {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl GeckoTrade {
    fn text(&self, keys: &[&str]) -> Option<String> {
        keys.iter()
            .filter_map(|k| self.attributes.get(*k))
            .filter_map(|v| v.as_str())
            .map(str::trim)
            .find(|s| !s.is_empty())
            .map(str::to_string)
    }

    fn number(&self, keys: &[&str]) -> Option<f64> {
        keys.iter()
            .filter_map(|k| self.attributes.get(*k))
            .find_map(value_to_f64)
    }
}

impl NormalizeTrade for GeckoTrade {
    fn normalize(&self) -> Option<Trade> {
        let id = self.id.trim();
        if id.is_empty() {
            return None;
        }

        let direction = self
            .text(&["kind", "trade_type"])
            .map(|label| TradeDirection::from_label(&label))
            .unwrap_or(TradeDirection::Unclassified);

        // from/to amounts are relative to the trader: a buy pays quote and receives base
        let from_amount = self.number(&["from_token_amount"]);
        let to_amount = self.number(&["to_token_amount"]);
        let (base_side, quote_side) = match direction {
            TradeDirection::Sell => (from_amount, to_amount),
            _ => (to_amount, from_amount),
        };

        let mut trade = Trade::new(id, direction);
        trade.base_amount = self
            .number(&["base_token_amount"])
            .or(base_side)
            .unwrap_or(0.0)
            .abs();
        trade.quote_amount = self
            .number(&["quote_token_amount"])
            .or(quote_side)
            .unwrap_or(0.0)
            .abs();
        trade.volume_usd = self
            .number(&["volume_in_usd", "trade_volume_in_usd", "amount_usd"])
            .unwrap_or(0.0);
        trade.trader = self
            .text(&["tx_from_address", "from_address", "trader_address", "maker"])
            .unwrap_or_default();
        trade.tx_hash = self
            .text(&["tx_hash", "transaction_hash"])
            .unwrap_or_default();
        trade.block_number = self.attributes.get("block_number").and_then(value_to_u64);
        trade.block_timestamp = self
            .text(&["block_timestamp"])
            .and_then(|ts| DateTime::parse_from_rfc3339(&ts).ok())
            .map(|ts| ts.with_timezone(&Utc));
        trade.received_token = self.text(&["to_token_address"]);

        Some(trade)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GeckoPool {
    #[serde(default)]
    id: String,
    #[serde(default)]
    attributes: GeckoPoolAttributes,
    #[serde(default)]
    relationships: GeckoRelationships,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GeckoPoolAttributes {
    #[serde(default)]
    address: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    base_token_price_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    reserve_in_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    market_cap_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    fdv_usd: Option<f64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    holders: Option<u64>,
    #[serde(default)]
    price_change_percentage: Option<GeckoPriceChange>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GeckoPriceChange {
    #[serde(default, deserialize_with = "lenient_f64")]
    h24: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GeckoRelationships {
    #[serde(default)]
    base_token: Option<GeckoRelation>,
    #[serde(default)]
    quote_token: Option<GeckoRelation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GeckoRelation {
    #[serde(default)]
    data: Option<GeckoRef>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GeckoRef {
    #[serde(default)]
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct GeckoIncluded {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    attributes: GeckoIncludedAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GeckoIncludedAttributes {
    #[serde(default)]
    symbol: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GeckoTokenInfo {
    #[serde(default)]
    attributes: GeckoTokenInfoAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GeckoTokenInfoAttributes {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    telegram_handle: Option<String>,
}

/// Resolve `relationships.<side>` to the symbol of the included token
fn related_symbol(relation: &Option<GeckoRelation>, included: &[GeckoIncluded]) -> Option<String> {
    let id = relation.as_ref()?.data.as_ref()?.id.as_str();
    included
        .iter()
        .filter(|item| item.kind == "token" && item.id == id)
        .find_map(|item| item.attributes.symbol.clone())
        .filter(|s| !s.is_empty())
}

impl GeckoPool {
    fn address(&self, network: &str) -> String {
        self.attributes
            .address
            .clone()
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| strip_network_prefix(&self.id, network).to_string())
    }

    fn market_data(&self, included: &[GeckoIncluded]) -> PoolMarketData {
        let attrs = &self.attributes;
        PoolMarketData {
            metrics: PoolMetrics {
                price_usd: attrs.base_token_price_usd,
                liquidity_usd: attrs.reserve_in_usd,
                market_cap_usd: attrs.market_cap_usd.or(attrs.fdv_usd),
                fdv_usd: attrs.fdv_usd,
                holders: attrs.holders,
                price_change_24h: attrs.price_change_percentage.as_ref().and_then(|p| p.h24),
            },
            base_symbol: related_symbol(&self.relationships.base_token, included),
            quote_symbol: related_symbol(&self.relationships.quote_token, included),
            social_url: None,
        }
    }
}

/// A pool found for a token, used when registering by token address
#[derive(Debug, Clone, PartialEq)]
pub struct PoolCandidate {
    pub address: String,
    pub name: String,
    pub base_symbol: Option<String>,
    pub quote_symbol: Option<String>,
    pub reserve_usd: f64,
}

/// Token metadata from `/tokens/{address}/info`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenProfile {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub telegram_handle: Option<String>,
}

/// Pick the candidate with the deepest USD reserve
fn best_candidate(list: GeckoList<GeckoPool>, network: &str) -> Option<PoolCandidate> {
    list.data
        .iter()
        .map(|pool| PoolCandidate {
            address: pool.address(network),
            name: pool.attributes.name.clone().unwrap_or_default(),
            base_symbol: related_symbol(&pool.relationships.base_token, &list.included),
            quote_symbol: related_symbol(&pool.relationships.quote_token, &list.included),
            reserve_usd: pool.attributes.reserve_in_usd.unwrap_or(0.0),
        })
        .filter(|c| !c.address.is_empty())
        .fold(None, |best: Option<PoolCandidate>, candidate| match best {
            Some(b) if b.reserve_usd >= candidate.reserve_usd => Some(b),
            _ => Some(candidate),
        })
}

/// Client for the GeckoTerminal public API
#[derive(Debug, Clone)]
pub struct GeckoTerminal {
    http: HttpClient,
    base_url: String,
}

impl GeckoTerminal {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            base_url: GECKO_API.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Raw recent trades for a pool, newest first as served
    pub async fn trades(
        &self,
        network: &str,
        pool_address: &str,
        limit: usize,
    ) -> Result<Vec<GeckoTrade>, FeedError> {
        let url = format!("{}/networks/{}/pools/{}/trades", self.base_url, network, pool_address);
        let list: GeckoList<GeckoTrade> = self
            .http
            .get_json(&url, &[("limit", limit.to_string())])
            .await?;
        Ok(list.data)
    }

    /// Current market data for a pool, with base/quote symbols resolved
    pub async fn pool(&self, network: &str, pool_address: &str) -> Result<PoolMarketData, FeedError> {
        let url = format!("{}/networks/{}/pools/{}", self.base_url, network, pool_address);
        let doc: GeckoDocument<GeckoPool> = self
            .http
            .get_json(&url, &[("include", "base_token,quote_token,dex".to_string())])
            .await?;
        Ok(doc.data.market_data(&doc.included))
    }

    /// The most liquid pool trading `token_address`, if any
    pub async fn resolve_best_pool(
        &self,
        network: &str,
        token_address: &str,
    ) -> Result<Option<PoolCandidate>, FeedError> {
        let url = format!("{}/networks/{}/tokens/{}/pools", self.base_url, network, token_address);
        let list: GeckoList<GeckoPool> = self
            .http
            .get_json(&url, &[("include", "base_token,quote_token,dex".to_string())])
            .await?;
        Ok(best_candidate(list, network))
    }

    pub async fn token_info(&self, network: &str, token_address: &str) -> Result<TokenProfile, FeedError> {
        let url = format!("{}/networks/{}/tokens/{}/info", self.base_url, network, token_address);
        let doc: GeckoDocument<GeckoTokenInfo> = self.http.get_json(&url, &[]).await?;
        let attrs = doc.data.attributes;
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        Ok(TokenProfile {
            name: non_empty(attrs.name),
            symbol: non_empty(attrs.symbol),
            telegram_handle: non_empty(attrs.telegram_handle),
        })
    }
}

#[async_trait]
impl TradeFeed for GeckoTerminal {
    fn name(&self) -> &str {
        "geckoterminal"
    }

    async fn fetch_recent_trades(&self, pool: &Pool, limit: usize) -> Result<Vec<Trade>, FeedError> {
        let raw = self.trades(&pool.key.network, &pool.key.address, limit).await?;
        let total = raw.len();
        let trades: Vec<Trade> = raw.iter().filter_map(NormalizeTrade::normalize).collect();

        if trades.len() < total {
            debug!("Dropped {} unidentifiable trades for {}", total - trades.len(), pool.key);
        }
        Ok(trades)
    }
}

#[async_trait]
impl StatsSource for GeckoTerminal {
    fn name(&self) -> &str {
        "geckoterminal"
    }

    async fn market_data(&self, pool: &Pool) -> Result<PoolMarketData, FeedError> {
        self.pool(&pool.key.network, &pool.key.address).await
    }
}
