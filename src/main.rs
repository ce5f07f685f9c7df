use anyhow::{anyhow, Context, Result};
use clap::Parser;
use dotenv::dotenv;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use dex_buy_alerts::cli::{self, Cli, Command};
use dex_buy_alerts::config;
use dex_buy_alerts::context::AppContext;
use dex_buy_alerts::db::Database;
use dex_buy_alerts::monitoring::{LogNotifier, MessageSender};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment variables
    dotenv().ok();

    // Initialize logging
    init_logger();

    let args = Cli::parse();

    // Load configuration
    let config = config::load_config()?;

    // Connect to database
    let db = Database::new(&config.database_path)
        .await
        .with_context(|| format!("Failed to open database {}", config.database_path))?;

    let ctx = AppContext::new(config, db)?;

    match args.command {
        Command::Run { dry_run } => run(ctx, dry_run).await,
        Command::Track {
            chat,
            token,
            pool,
            title,
        } => {
            let pool = cli::track(&ctx, chat, &token, pool.as_deref(), &title).await?;
            println!("Tracking {} in chat {} ({})", pool.display_symbol(), chat, pool.key);
            Ok(())
        }
        Command::Untrack { chat, address } => {
            let removed = cli::untrack(&ctx, chat, &address).await?;
            println!("Removed {} subscription(s)", removed);
            Ok(())
        }
        Command::SetLinks {
            chat,
            book_trend_url,
            trending_url,
        } => {
            ctx.db.set_group_links(chat, &book_trend_url, &trending_url).await?;
            println!("Updated buttons for chat {}", chat);
            Ok(())
        }
        Command::SetDtrade { chat, referral } => {
            ctx.db.set_group_referral(chat, referral.trim()).await?;
            println!("Updated dTrade referral for chat {}", chat);
            Ok(())
        }
        Command::List { chat } => {
            for line in cli::list(&ctx, chat).await? {
                println!("{}", line);
            }
            Ok(())
        }
    }
}

fn sender_for(ctx: &AppContext, dry_run: bool) -> Result<Arc<dyn MessageSender>> {
    if dry_run {
        info!("Dry run: alerts are logged, not sent");
        return Ok(Arc::new(LogNotifier));
    }

    let token = ctx.config.require_bot_token()?;
    live_sender(token)
}

#[cfg(feature = "telegram")]
fn live_sender(token: &str) -> Result<Arc<dyn MessageSender>> {
    Ok(Arc::new(dex_buy_alerts::monitoring::TelegramSender::new(token)))
}

#[cfg(not(feature = "telegram"))]
fn live_sender(_token: &str) -> Result<Arc<dyn MessageSender>> {
    Err(anyhow!("built without the telegram feature; use --dry-run"))
}

async fn run(ctx: AppContext, dry_run: bool) -> Result<()> {
    info!("Starting buy alert bot on {}...", ctx.config.network);

    let sender = sender_for(&ctx, dry_run)?;
    let (stop_tx, stop_rx) = watch::channel(false);
    let watcher = ctx.watcher(sender, stop_rx);
    let mut handle = tokio::spawn(watcher.run());

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            info!("Shutdown signal received");
        }
        finished = &mut handle => {
            return Err(anyhow!("Watcher exited unexpectedly: {:?}", finished));
        }
    }

    stop_tx.send(true).ok();

    // The running iteration is allowed to finish
    let grace = Duration::from_secs(ctx.config.http_timeout_seconds + ctx.config.send_timeout_seconds) * 4;
    match tokio::time::timeout(grace, handle).await {
        Ok(Ok(state)) => info!("Watcher {:?}", state),
        Ok(Err(e)) => error!("Watcher task failed: {}", e),
        Err(_) => error!("Watcher did not stop within {:?}", grace),
    }

    info!("Shutting down...");
    Ok(())
}

fn init_logger() {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or("RUST_LOG", "info")
    );
}
