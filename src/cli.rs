use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use crate::context::AppContext;
use crate::models::{Pool, PoolKey};
use crate::utils::format::telegram_handle_url;

#[derive(Parser, Debug)]
#[command(name = "dex-buy-alerts")]
#[command(about = "Posts DEX buy alerts for tracked pools to Telegram chats", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Start polling and posting alerts
    Run {
        /// Log alerts instead of sending them
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },
    /// Subscribe a chat to a token's pool
    Track {
        #[arg(long, allow_hyphen_values = true)]
        chat: i64,
        /// Token contract address
        #[arg(long)]
        token: String,
        /// Pool address; the most liquid pool of the token when omitted
        #[arg(long)]
        pool: Option<String>,
        /// Chat title shown in listings
        #[arg(long, default_value = "")]
        title: String,
    },
    /// Remove a chat's subscription by token or pool address
    Untrack {
        #[arg(long, allow_hyphen_values = true)]
        chat: i64,
        address: String,
    },
    /// Set the Book Trend and Trending buttons of a chat
    SetLinks {
        #[arg(long, allow_hyphen_values = true)]
        chat: i64,
        book_trend_url: String,
        trending_url: String,
    },
    /// Set the dTrade referral code of a chat
    SetDtrade {
        #[arg(long, allow_hyphen_values = true)]
        chat: i64,
        referral: String,
    },
    /// List tracked pools, for one chat or all of them
    List {
        #[arg(long, allow_hyphen_values = true)]
        chat: Option<i64>,
    },
}

/// Strip whitespace and stray quotes around a pasted address
fn clean_address(raw: &str) -> String {
    raw.trim().trim_matches(|c| c == '`' || c == '\'' || c == '"').to_string()
}

pub async fn track(ctx: &AppContext, chat: i64, token: &str, pool: Option<&str>, title: &str) -> Result<Pool> {
    let network = ctx.config.network.as_str();
    let token = clean_address(token);
    if token.is_empty() {
        return Err(anyhow!("token address is empty"));
    }

    let pool_address = match pool.map(clean_address).filter(|p| !p.is_empty()) {
        Some(address) => address,
        None => ctx
            .gecko
            .resolve_best_pool(network, &token)
            .await
            .context("Failed to look up pools for token")?
            .map(|candidate| candidate.address)
            .ok_or_else(|| anyhow!("no pool found for token {} on {}", token, network))?,
    };

    let mut pool = Pool::new(PoolKey::new(network, pool_address.as_str()));
    pool.token_address = token.clone();

    // Metadata is best effort; stats refreshes fill the rest later
    match ctx.gecko.pool(network, &pool_address).await {
        Ok(data) => {
            pool.base_symbol = data.base_symbol.unwrap_or_default();
            pool.quote_symbol = data.quote_symbol.unwrap_or_default();
        }
        Err(e) => warn!("Could not load pool {}: {}", pool_address, e),
    }
    match ctx.gecko.token_info(network, &token).await {
        Ok(profile) => {
            pool.symbol = profile.symbol.unwrap_or_default();
            pool.name = profile.name.unwrap_or_default();
            pool.social_url = profile.telegram_handle.as_deref().and_then(telegram_handle_url);
        }
        Err(e) => warn!("Could not load token info for {}: {}", token, e),
    }

    ctx.db.upsert_pool(&pool).await?;
    ctx.db.upsert_group(chat, title).await?;
    ctx.db.subscribe(chat, &pool.key, &token).await?;

    info!("Chat {} now tracks {} ({})", chat, pool.display_symbol(), pool.key);
    Ok(pool)
}

/// Returns the number of subscriptions removed
pub async fn untrack(ctx: &AppContext, chat: i64, address: &str) -> Result<u64> {
    let address = clean_address(address);
    let network = ctx.config.network.as_str();

    let by_token = ctx.db.unsubscribe_token(chat, network, &address).await?;
    let by_pool = ctx.db.unsubscribe(chat, &PoolKey::new(network, address.as_str())).await?;

    info!("Removed {} subscriptions of chat {} matching {}", by_token + by_pool, chat, address);
    Ok(by_token + by_pool)
}

pub async fn list(ctx: &AppContext, chat: Option<i64>) -> Result<Vec<String>> {
    let pools = match chat {
        Some(chat) => ctx.db.list_group_pools(chat).await?,
        None => ctx.db.list_pools().await?,
    };

    Ok(pools
        .iter()
        .map(|pool| {
            let cursor = pool
                .last_cursor
                .as_ref()
                .map(|c| c.trade_id.as_str())
                .unwrap_or("-");
            format!(
                "{:<10} {} token={} cursor={}",
                pool.display_symbol(),
                pool.key,
                pool.token_address,
                cursor
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::init_test_db;
    use pretty_assertions::assert_eq;

    async fn context() -> AppContext {
        AppContext::new(Config::default(), init_test_db().await.unwrap()).unwrap()
    }

    #[test]
    fn test_parse_commands() {
        let cli = Cli::parse_from(["dex-buy-alerts", "run", "--dry-run"]);
        assert_eq!(cli.command, Command::Run { dry_run: true });

        let cli = Cli::parse_from(["dex-buy-alerts", "set-links", "--chat", "-1001", "https://a", "https://b"]);
        assert_eq!(
            cli.command,
            Command::SetLinks {
                chat: -1001,
                book_trend_url: "https://a".to_string(),
                trending_url: "https://b".to_string(),
            }
        );
    }

    #[test]
    fn test_clean_address() {
        assert_eq!(clean_address("  `EQabc` "), "EQabc");
        assert_eq!(clean_address("\"EQabc\""), "EQabc");
    }

    #[tokio::test]
    async fn test_untrack_by_token_or_pool() {
        let ctx = context().await;
        let mut pool = Pool::new(PoolKey::new("ton", "EQpool"));
        pool.token_address = "EQtoken".to_string();
        ctx.db.upsert_pool(&pool).await.unwrap();
        ctx.db.subscribe(5, &pool.key, "EQtoken").await.unwrap();
        ctx.db.subscribe(6, &pool.key, "EQtoken").await.unwrap();

        assert_eq!(untrack(&ctx, 5, "EQtoken").await.unwrap(), 1);
        assert_eq!(untrack(&ctx, 6, "`EQpool`").await.unwrap(), 1);
        assert_eq!(untrack(&ctx, 6, "EQpool").await.unwrap(), 0);
        assert!(list(&ctx, Some(6)).await.unwrap().is_empty());
        assert_eq!(list(&ctx, None).await.unwrap().len(), 1);
    }
}
