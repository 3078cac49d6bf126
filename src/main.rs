// main.rs — clipfetch entry point.
use std::{path::PathBuf, sync::Arc, time::Duration};

use teloxide::prelude::*;
use tracing::info;

mod bot;
mod config;
mod downloader;
mod error;
mod fetcher;
mod instagram;
mod recognize;
mod smule;
mod strategy;
mod ytdlp;

use config::Config;
use strategy::{ChainContext, BROWSER_UA};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let base_dir = if let Ok(manifest) = std::env::var("CARGO_MANIFEST_DIR") {
        PathBuf::from(manifest)
    } else {
        std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."))
    };
    info!("📂 base_dir = {}", base_dir.display());

    let env_path = base_dir.join("bot.env");
    if env_path.exists() {
        dotenvy::from_path(&env_path).ok();
    } else {
        dotenvy::dotenv().ok();
    }

    let token = std::env::var("BOT_TOKEN").expect("BOT_TOKEN not set in bot.env");

    let cfg = Arc::new(Config::load(&base_dir));
    cfg.print_summary();

    std::fs::create_dir_all(&cfg.downloads_dir).expect("create downloads directory");

    // No whole-request timeout here: media fetches are bounded by the
    // orchestrator's budget, scrape calls set their own per-request timeout.
    let http = reqwest::Client::builder()
        .user_agent(BROWSER_UA)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .expect("build HTTP client");

    let ctx = Arc::new(ChainContext { cfg, http });

    let bot = Bot::new(token);
    info!("🤖 Bot started successfully!");

    Dispatcher::builder(bot, bot::schema())
        .dependencies(dptree::deps![ctx])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}
