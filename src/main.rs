//! hambot - Slack bot for the hamagrams site
//!
//! Echoes ham, relays announcements to the ham base and uploads hamagram
//! prompts to S3.
//!
//! ## Architecture
//!
//! - `config` - Environment / JSON file configuration
//! - `platform` - Slack Socket Mode adapter (events in, messages out)
//! - `bot` - Directory, normalizer, dispatcher and the event loop
//! - `plugins` - Command handlers (extensible)
//! - `storage` - Prompt upload to S3
//! - `utils` - Utility functions

mod bot;
mod config;
mod platform;
mod plugins;
mod storage;
mod utils;

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use platform::slack;
use storage::S3Uploader;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("hambot=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    info!("Starting hambot...");

    let config = Config::load()?;
    info!("Configuration loaded successfully");
    info!("Broadcast channel: #{}", config.ham_base);
    match &config.announcer {
        Some(announcer) => info!("Announcer: @{}", announcer),
        None => info!("No announcer configured (ANNOUNCER is empty)"),
    }

    let uploader = S3Uploader::from_config(&config.storage)?;
    info!(
        "Uploading prompts to s3://{}/{}",
        config.storage.bucket, config.storage.key
    );

    let (events, outgoing) = slack::connect(&config.slack);
    info!("Connecting to Slack...");

    tokio::select! {
        result = bot::run(&config, events, Arc::new(outgoing), Arc::new(uploader)) => result?,
        _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, shutting down"),
    }

    Ok(())
}
