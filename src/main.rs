mod client;
mod config;
mod models;
mod notifier;
mod runner;
mod scheduler;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use config::{Config, RunMode};
use runner::Runner;

/// SimplyBook.it slot watcher: poll for free appointment slots and notify
/// a Telegram chat when one appears.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Run a single check immediately and exit, regardless of NODE_ENV
    #[arg(long)]
    once: bool,

    /// Print detailed API responses
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let config = Config::from_env()?;

    info!("SimplyBook.it slot watcher");
    info!("Checking: {}", config.book_it_host);
    info!("Days ahead: {}", config.days_ahead);
    info!("Provider: {}, Service: {}", config.provider, config.service);
    if !config.dates_ignore.is_empty() {
        info!("Ignoring dates: {:?}", config.dates_ignore);
    }

    let mode = if cli.once {
        RunMode::Once
    } else {
        config.run_mode
    };
    let schedule = config.schedule.clone();
    let runner = Runner::new(config)?;

    match mode {
        RunMode::Once => {
            info!("Running single check");
            runner.tick().await;
        }
        RunMode::Scheduled => {
            info!("Scheduler started (cron: {})", schedule);
            scheduler::run_scheduled(&schedule, &runner).await;
        }
    }

    Ok(())
}
