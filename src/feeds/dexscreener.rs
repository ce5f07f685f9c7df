use async_trait::async_trait;
use serde::Deserialize;

use crate::feeds::{FeedError, HttpClient, StatsSource};
use crate::models::{Pool, PoolMarketData, PoolMetrics};
use crate::utils::lenient_f64;

pub const DEXSCREENER_API: &str = "https://api.dexscreener.com";

#[derive(Debug, Clone, Default, Deserialize)]
struct PairsResponse {
    #[serde(default)]
    pairs: Option<Vec<DexPair>>,
    #[serde(default)]
    pair: Option<DexPair>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexPair {
    #[serde(default)]
    pair_address: String,
    #[serde(default)]
    base_token: Option<DexToken>,
    #[serde(default)]
    quote_token: Option<DexToken>,
    #[serde(default, deserialize_with = "lenient_f64")]
    price_usd: Option<f64>,
    #[serde(default)]
    liquidity: Option<DexLiquidity>,
    #[serde(default, deserialize_with = "lenient_f64")]
    fdv: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    market_cap: Option<f64>,
    #[serde(default)]
    price_change: Option<DexPriceChange>,
    #[serde(default)]
    info: Option<DexInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DexToken {
    #[serde(default)]
    symbol: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DexLiquidity {
    #[serde(default, deserialize_with = "lenient_f64")]
    usd: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DexPriceChange {
    #[serde(default, deserialize_with = "lenient_f64")]
    h24: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DexInfo {
    #[serde(default)]
    socials: Vec<DexSocial>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DexSocial {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    url: String,
}

impl PairsResponse {
    fn into_pair(self, address: &str) -> Option<DexPair> {
        if let Some(pair) = self.pair {
            return Some(pair);
        }
        let pairs = self.pairs?;
        let position = pairs
            .iter()
            .position(|p| p.pair_address.eq_ignore_ascii_case(address))
            .unwrap_or(0);
        pairs.into_iter().nth(position)
    }
}

impl DexPair {
    fn into_market_data(self) -> PoolMarketData {
        let social_url = self.info.and_then(|info| {
            info.socials
                .into_iter()
                .find(|s| s.kind.eq_ignore_ascii_case("telegram") && !s.url.is_empty())
                .map(|s| s.url)
        });

        PoolMarketData {
            metrics: PoolMetrics {
                price_usd: self.price_usd,
                liquidity_usd: self.liquidity.and_then(|l| l.usd),
                market_cap_usd: self.market_cap.or(self.fdv),
                fdv_usd: self.fdv,
                holders: None,
                price_change_24h: self.price_change.and_then(|p| p.h24),
            },
            base_symbol: self.base_token.and_then(|t| t.symbol),
            quote_symbol: self.quote_token.and_then(|t| t.symbol),
            social_url,
        }
    }
}

/// DexScreener pair lookups, used to fill gaps in the primary stats
#[derive(Debug, Clone)]
pub struct DexScreener {
    http: HttpClient,
    base_url: String,
}

impl DexScreener {
    pub fn new(http: HttpClient) -> Self {
        Self {
            http,
            base_url: DEXSCREENER_API.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub async fn pair(&self, chain: &str, pair_address: &str) -> Result<PoolMarketData, FeedError> {
        let url = format!("{}/latest/dex/pairs/{}/{}", self.base_url, chain, pair_address);
        let response: PairsResponse = self.http.get_json(&url, &[]).await?;

        response
            .into_pair(pair_address)
            .map(DexPair::into_market_data)
            .ok_or_else(|| FeedError::NotFound(format!("{}/{}", chain, pair_address)))
    }
}

#[async_trait]
impl StatsSource for DexScreener {
    fn name(&self) -> &str {
        "dexscreener"
    }

    async fn market_data(&self, pool: &Pool) -> Result<PoolMarketData, FeedError> {
        self.pair(&pool.key.network, &pool.key.address).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_pair_market_data() {
        let response: PairsResponse = serde_json::from_value(json!({
            "schemaVersion": "1.0.0",
            "pairs": [{
                "chainId": "ton",
                "pairAddress": "EQpool",
                "baseToken": {"address": "EQdogs", "name": "Dogs", "symbol": "DOGS"},
                "quoteToken": {"address": "EQton", "name": "Toncoin", "symbol": "TON"},
                "priceUsd": "0.00072",
                "liquidity": {"usd": 251000.0, "base": 1, "quote": 2},
                "fdv": 3700000,
                "marketCap": 3500000,
                "priceChange": {"m5": 0, "h24": 2.5},
                "info": {"socials": [
                    {"type": "twitter", "url": "https://x.com/dogs"},
                    {"type": "telegram", "url": "https://t.me/dogs"}
                ]}
            }]
        }))
        .unwrap();

        let data = response.into_pair("EQpool").unwrap().into_market_data();
        assert_eq!(data.metrics.price_usd, Some(0.00072));
        assert_eq!(data.metrics.liquidity_usd, Some(251000.0));
        assert_eq!(data.metrics.market_cap_usd, Some(3_500_000.0));
        assert_eq!(data.metrics.fdv_usd, Some(3_700_000.0));
        assert_eq!(data.metrics.price_change_24h, Some(2.5));
        assert_eq!(data.base_symbol.as_deref(), Some("DOGS"));
        assert_eq!(data.quote_symbol.as_deref(), Some("TON"));
        assert_eq!(data.social_url.as_deref(), Some("https://t.me/dogs"));
    }

    #[test]
    fn test_single_pair_shape_and_missing_pairs() {
        let single: PairsResponse = serde_json::from_value(json!({
            "pair": {"pairAddress": "EQpool", "fdv": "1000"}
        }))
        .unwrap();
        let data = single.into_pair("EQpool").unwrap().into_market_data();
        assert_eq!(data.metrics.market_cap_usd, Some(1000.0));

        let empty: PairsResponse = serde_json::from_value(json!({"pairs": null})).unwrap();
        assert!(empty.into_pair("EQpool").is_none());
    }
}
