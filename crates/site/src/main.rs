use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use datawise_site::{run_session, SessionOptions, SitePreloadConfig};

/// Replay a visit to the Datawise site and report which resources were
/// preloaded and when each page section rendered.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// JSON site configuration (built-in site defaults when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Route the visit lands on
    #[arg(long, default_value = "/")]
    route: String,

    #[arg(long, default_value_t = 1280)]
    viewport_width: u32,

    #[arg(long, default_value_t = 800)]
    viewport_height: u32,

    /// Scroll offsets to visit, in pixels
    #[arg(long, num_args = 1..)]
    scroll: Vec<f64>,

    /// Links to hover after scrolling
    #[arg(long)]
    hover: Vec<String>,

    /// Time spent at each scroll offset, in milliseconds
    #[arg(long, default_value_t = 400)]
    dwell_ms: u64,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    verbose: u8,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn log_level(&self) -> log::LevelFilter {
        if self.quiet {
            return log::LevelFilter::Error;
        }
        match self.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so the JSON report on stdout stays pipeable
    env_logger::Builder::new()
        .filter_level(cli.log_level())
        .parse_default_env()
        .target(env_logger::Target::Stderr)
        .init();

    let config = match &cli.config {
        Some(path) => SitePreloadConfig::load(path)?,
        None => SitePreloadConfig::default(),
    };

    if cli.print_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    log::info!("Datawise site session v{}", env!("CARGO_PKG_VERSION"));

    let options = SessionOptions {
        route: cli.route,
        viewport_width: cli.viewport_width,
        viewport_height: cli.viewport_height,
        scroll: cli.scroll,
        hover: cli.hover,
        dwell_ms: cli.dwell_ms,
        ..SessionOptions::default()
    };

    let report = run_session(&config, &options).await?;
    let json = serde_json::to_string_pretty(&report).context("Failed to serialize session report")?;
    println!("{}", json);
    Ok(())
}
