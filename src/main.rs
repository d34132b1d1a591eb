use bist_screener::config::ScreenerConfig;
use bist_screener::data_store::PanelStore;
use bist_screener::pipeline::{ScreenOutcome, Screener};
use bist_screener::report;

use anyhow::{Context, Result};
use chrono::Utc;
use log::{error, info, warn};
use std::env;
use std::path::Path;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logger with default info level if RUST_LOG not set
    if std::env::var("RUST_LOG").is_err() {
        unsafe { std::env::set_var("RUST_LOG", "info"); }
    }
    env_logger::init();
    info!("Starting BIST daily scan");

    // Get config file from command line argument or use default
    let args: Vec<String> = env::args().collect();
    let config_file = if args.len() > 1 {
        &args[1]
    } else {
        "config.json"
    };

    info!("Loading configuration from: {}", config_file);
    let config = ScreenerConfig::load_from_file(config_file)?;

    let now = Utc::now();
    if config.scan.enforce_market_hours && !report::is_market_open(now, &config.scan) {
        info!("Market is closed; no scan performed");
        return Ok(());
    }
    let scan_date = report::exchange_time(now, &config.scan)
        .map(|t| t.date_naive())
        .unwrap_or_else(|| now.date_naive());
    info!("Running daily scan for {}", scan_date);

    let store = PanelStore::new(&config.data);
    let output_dir = config.scan.output_dir.clone();
    let screener = Screener::new(config).context("Invalid screener configuration")?;

    let outcome = match screener.run(&store).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Screening failed: {}", e);
            return Err(e.into());
        }
    };

    let table = match outcome {
        ScreenOutcome::Empty { fallback } => {
            if fallback {
                warn!("Fallback universe produced no confirmed candidates");
            }
            info!("No instrument met the screening criteria");
            return Ok(());
        }
        ScreenOutcome::Fallback(table) => {
            warn!("Candidates come from the top-Sharpe fallback universe");
            table
        }
        ScreenOutcome::Filtered(table) => table,
    };

    let path = report::save_daily_results(&table, Path::new(&output_dir), scan_date)?;
    info!("Results saved to {}", path.display());
    println!("{}", report::summarize(&table, 3));

    Ok(())
}
