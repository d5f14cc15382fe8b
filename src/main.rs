// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use anyhow::{Context, Result};
use clap::Parser;
use inception_gateway::{api::start_server, config::Args, startup, version};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("🚀 Starting Inception Gateway...\n");
    println!("📦 BUILD VERSION: {}", version::VERSION);
    println!("📅 Build Date: {}", version::BUILD_DATE);
    println!();
    info!("{}", version::get_version_string());
    info!("Features: {}", version::FEATURES.join(", "));

    let config = args.into_config().context("Invalid configuration")?;

    info!(
        "Deployment mode: {} ({})",
        config.mode,
        config.mode.description()
    );

    let state = match startup::build_state(&config).await {
        Ok(state) => state,
        Err(e) => {
            // Serving without a model is never useful
            error!("❌ Startup failed: {:#}", e);
            return Err(e);
        }
    };

    start_server(state, config.listen_addr, config.max_concurrent_requests).await
}
