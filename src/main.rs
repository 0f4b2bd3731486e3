use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use dotenvy::dotenv;

use tracing::info;

use restream::{AppConfig, Logger, RestreamServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let config = AppConfig::parse();
    config.validate().context("invalid configuration")?;
    let config = Arc::new(config);

    // init logger and sentry, guards are kept alive to flush logs and maintain sentry connection
    let _guards = Logger::init(config.cargo_env, config.sentry_dsn.clone());

    info!(
        "logger and env prepped, {} playlists configured...",
        config.playlists.len()
    );

    RestreamServer::serve(config)
        .await
        .context("restream server failed to start")?;

    Ok(())
}
