use clap::Parser;

/// A polite, resumable, single-host web crawler.
#[derive(Parser)]
#[command(name = "webcrawl", about = "Polite, resumable, single-host web crawler")]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Overrides `general.start_url` from the config file.
    #[arg(long)]
    pub start_url: Option<String>,

    /// Overrides `general.max_depth` from the config file.
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// Overrides `general.max_pages` from the config file.
    #[arg(long)]
    pub max_pages: Option<u64>,

    /// Clears the frontier before seeding, equivalent to `general.reset_frontier = true`.
    #[arg(long)]
    pub reset_frontier: bool,
}
