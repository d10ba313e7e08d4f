/// main.rs — Crossover Trader Entry Point
///
/// Runs the dual moving-average crossover strategy:
///   1. Load config from .env / environment
///   2. Fetch BACKTEST_DAYS of daily bars and print the backtest report
///   3. With --live: load broker credentials and poll the market until Ctrl-C
///
/// Usage:
///   cargo run --bin crossover_trader
///   cargo run --bin crossover_trader -- --live

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crossover_engine::backtest::run_backtest;
use crossover_engine::config::{AppConfig, BrokerCredentials};
use crossover_engine::data::YahooDataClient;
use crossover_engine::engine::LiveTrader;
use crossover_engine::live::AlpacaClient;

#[derive(Parser)]
#[command(name = "crossover_trader")]
#[command(about = "Dual moving-average crossover: backtest on startup, optional live trading")]
#[command(version)]
struct Cli {
    /// Start the live trading loop after the backtest
    #[arg(long)]
    live: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Config ───────────────────────────────────────────────────────────
    let cfg = AppConfig::from_env().context("loading configuration")?;
    init_logging(cfg.log_file.as_deref())?;

    // Credentials are a startup requirement of live mode, checked before any work.
    let credentials = if cli.live {
        Some(BrokerCredentials::from_env().context("loading broker credentials")?)
    } else {
        None
    };

    info!(
        "Config: symbol={} sma={}/{} size={:.2} stop={:.2} backtest_days={}",
        cfg.strategy.symbol,
        cfg.strategy.short_window,
        cfg.strategy.long_window,
        cfg.strategy.position_size,
        cfg.strategy.stop_loss_pct,
        cfg.backtest_days
    );

    // ── Backtest ─────────────────────────────────────────────────────────
    let data_client = YahooDataClient::new(&cfg.yahoo_chart_url)?;
    let end = Utc::now().date_naive();
    let start = end - Duration::days(cfg.backtest_days);
    let report = run_backtest(&data_client, &cfg.strategy, start, end)
        .await
        .with_context(|| format!("backtest of {} failed", cfg.strategy.symbol))?;
    println!("\n{report}");

    // ── Live trading ─────────────────────────────────────────────────────
    let Some(credentials) = credentials else {
        return Ok(());
    };

    if credentials.base_url.contains("paper-api") {
        info!("Broker endpoint is a paper account: {}", credentials.base_url);
    } else {
        warn!("LIVE ENDPOINT {} — orders use real money", credentials.base_url);
    }

    let broker = AlpacaClient::new(credentials)?;
    let mut trader = LiveTrader::new(cfg.strategy.clone(), cfg.schedule.clone(), data_client, broker)?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Cannot listen for Ctrl-C ({e}); stop the process to exit");
            std::future::pending::<()>().await;
        }
    };
    trader.run(shutdown).await.context("live trading stopped")?;

    let state = trader.state();
    if state.is_long() {
        warn!(
            "Exited while holding {} {} (entry {:.2})",
            state.quantity, cfg.strategy.symbol, state.entry_price
        );
    }
    Ok(())
}

/// Timestamped log lines, appended to `log_file` or written to stdout.
fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
    Ok(())
}
