mod cli;
mod crawl;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::warn;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use webcrawl_core::AppConfig;

use crate::cli::Cli;

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let mut config: AppConfig = toml::from_str(&config_str).context("parsing configuration")?;

    if let Some(start_url) = cli.start_url {
        config.general.start_url = Some(start_url);
    }
    if let Some(max_depth) = cli.max_depth {
        config.general.max_depth = max_depth;
    }
    if let Some(max_pages) = cli.max_pages {
        config.general.max_pages = max_pages;
    }
    if cli.reset_frontier {
        config.general.reset_frontier = true;
    }

    if let Ok(v) = std::env::var("MAX_DEPTH") {
        if let Ok(n) = v.parse::<u32>() {
            config.general.max_depth = n;
        }
    }
    if let Ok(v) = std::env::var("DATABASE_URL") {
        config.database.backend = "postgresql".to_string();
        config.database.postgres_url = Some(v);
    }

    let engine = crawl::CrawlEngine::new(config).await?;
    engine.run().await?;

    Ok(())
}
