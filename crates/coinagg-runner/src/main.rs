//! # coinagg-runner
//!
//! Command-line entry point for the market data aggregator.
//!
//! Loads a JSON configuration file, builds the aggregation service from the
//! configured sources, and runs one command against it.
//!
//! # Usage
//!
//! ```bash
//! coinagg-runner config.json snapshot
//! coinagg-runner config.json entry BTCUSDT
//! coinagg-runner config.json klines BTCUSDT 60 --limit 24
//! coinagg-runner config.json --log-level debug watch --interval-secs 30
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use coinagg_core::time_util::now_ms;
use coinagg_md::AggregationService;
use coinagg_md::bybit::klines::{BybitKlineClient, KlineRequest, MAX_LIMIT};
use serde_json::json;
use tracing::{info, warn};

/// Crypto market data aggregator.
#[derive(Parser)]
#[command(name = "coinagg-runner", about = "Crypto market data aggregator")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(short, long)]
    log_level: Option<String>,

    /// Optional log directory for file output. Overrides the config file.
    #[arg(long)]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the merged snapshot as JSON.
    Snapshot,

    /// Print one symbol's entry.
    Entry { symbol: String },

    /// Fetch candlesticks straight from Bybit, bypassing the cache.
    Klines {
        symbol: String,
        /// 1 3 5 15 30 60 120 240 360 720 D W M
        interval: String,
        #[arg(long)]
        start: Option<u64>,
        #[arg(long)]
        end: Option<u64>,
        #[arg(long, default_value_t = MAX_LIMIT)]
        limit: u32,
    },

    /// Read the snapshot periodically until Ctrl+C.
    Watch {
        #[arg(long, default_value_t = 60)]
        interval_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = coinagg_core::config::load_config(&cli.config)?;

    // 2. Initialize logging
    let log_level = cli.log_level.as_deref().unwrap_or(&config.logging.log_level);
    let log_dir = cli.log_dir.as_deref().or(config.logging.log_path.as_deref());
    coinagg_core::logging::init_logging(log_level, log_dir, &config.logging.module_name);

    info!(
        "coinagg-runner starting, config={}, {} source(s), quote={}",
        cli.config.display(),
        config.sources.len(),
        config.universe.quote_asset
    );

    // 3. Run the command
    match cli.command {
        Command::Snapshot => {
            let service = AggregationService::from_config(&config)?;
            let snapshot = service.get_snapshot().await?;
            println!("{}", serde_json::to_string_pretty(snapshot.as_ref())?);
        }
        Command::Entry { symbol } => {
            let service = AggregationService::from_config(&config)?;
            let entry = service.get_entry(&symbol).await?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
        }
        Command::Klines { symbol, interval, start, end, limit } => {
            let client = BybitKlineClient::new(&config.klines)?;
            let request = KlineRequest {
                start_ms: start,
                end_ms: end,
                limit,
                ..KlineRequest::new(&symbol, &interval)
            };
            let candles = client.fetch(&request).await?;
            let body = json!({
                "symbol": request.symbol,
                "interval": request.interval,
                "candles": candles,
            });
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Command::Watch { interval_secs } => {
            let service = AggregationService::from_config(&config)?;
            watch(&service, Duration::from_secs(interval_secs.max(1))).await?;
        }
    }

    Ok(())
}

async fn watch(service: &AggregationService, every: Duration) -> Result<()> {
    let mut ticker = tokio::time::interval(every);
    info!("watching every {every:?}, press Ctrl+C to stop");

    loop {
        tokio::select! {
            _ = ticker.tick() => match service.get_snapshot().await {
                Ok(snapshot) => {
                    let age_ms = snapshot.age_ms(now_ms());
                    let failed = snapshot.failed_sources();
                    if failed.is_empty() {
                        info!("{} symbol(s), age={age_ms}ms", snapshot.len());
                    } else {
                        warn!("{} symbol(s), age={age_ms}ms, degraded: {failed:?}", snapshot.len());
                    }
                }
                Err(e) => warn!("snapshot unavailable: {e}"),
            },
            res = tokio::signal::ctrl_c() => {
                res?;
                info!("shutdown signal received, state={:?}", service.status());
                return Ok(());
            }
        }
    }
}
