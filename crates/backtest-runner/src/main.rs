//! backtest-runner: build point-in-time snapshots over a date range, replay
//! them as trades, and print the backtest report as JSON.
//!
//! Usage:
//!   cargo run -p backtest-runner                      # backtest (default)
//!   cargo run -p backtest-runner -- rank              # live ranking as of today
//!   cargo run -p backtest-runner -- rank 2025-06-01   # ranking as of a date
//!
//! Configuration comes from the environment (see `config.rs`); a `.env` file
//! is loaded first if present.

mod config;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use analysis_core::PriceLookup;
use analysis_orchestrator::{AnalysisOrchestrator, CompositeScorer, ProviderCache, ProviderRegistry, Screener, ScreenerFilters};
use anyhow::{bail, Context, Result};
use backtest_engine::{BacktestConfig, BacktestEngine, BacktestReport};
use chrono::{NaiveDate, Utc};
use dimension_providers::{standard_providers, DatasetPriceLookup, HistoricalDataset};
use time_machine::{SnapshotBuilder, SqliteSnapshotStore, TimeMachine};

use config::RunnerConfig;

enum Mode {
    Backtest,
    Rank { as_of: NaiveDate },
}

impl Mode {
    fn from_args(args: &[String]) -> Result<Self> {
        match args.first().map(String::as_str) {
            None | Some("backtest") => Ok(Mode::Backtest),
            Some("rank") => {
                let as_of = match args.get(1) {
                    Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                        .with_context(|| format!("rank date must be YYYY-MM-DD, got {raw:?}"))?,
                    None => Utc::now().date_naive(),
                };
                Ok(Mode::Rank { as_of })
            }
            Some(other) => bail!("unknown mode {other:?} (expected `backtest` or `rank`)"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    // Logs go to stderr so stdout carries only the JSON report
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter())
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter())
            .with_writer(std::io::stderr)
            .init();
    }

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mode = Mode::from_args(&args)?;
    let config = RunnerConfig::from_env()?;

    tracing::info!("Loading dataset from {}", config.dataset_path.display());
    let dataset = Arc::new(HistoricalDataset::load(&config.dataset_path)?);
    let universe = dataset.instrument_ids();
    tracing::info!("Dataset loaded: {} instruments", universe.len());

    let registry = ProviderRegistry::with_providers(standard_providers(Arc::clone(&dataset)))?;
    let orchestrator = Arc::new(AnalysisOrchestrator::new(
        registry,
        Arc::new(ProviderCache::new()),
        config.resilience_policy(),
        CompositeScorer::default(),
    ));
    let prices: Arc<dyn PriceLookup> = Arc::new(DatasetPriceLookup::new(Arc::clone(&dataset)));

    match mode {
        Mode::Rank { as_of } => run_rank(&config, orchestrator, universe, as_of).await,
        Mode::Backtest => run_backtest(&config, orchestrator, prices, universe).await,
    }
}

async fn run_rank(
    config: &RunnerConfig,
    orchestrator: Arc<AnalysisOrchestrator>,
    universe: Vec<String>,
    as_of: NaiveDate,
) -> Result<()> {
    let filters = ScreenerFilters {
        limit: config.rank_limit,
        ..ScreenerFilters::default()
    };
    let ranking = Screener::new(orchestrator).rank(universe, as_of, filters).await;
    tracing::info!(
        "Ranked {} of {} instruments as of {}",
        ranking.entries.len(),
        ranking.total_analyzed,
        as_of
    );
    println!("{}", serde_json::to_string_pretty(&ranking)?);
    Ok(())
}

async fn run_backtest(
    config: &RunnerConfig,
    orchestrator: Arc<AnalysisOrchestrator>,
    prices: Arc<dyn PriceLookup>,
    universe: Vec<String>,
) -> Result<()> {
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Stop requested; finishing in-flight instruments");
                cancel.store(true, Ordering::SeqCst);
            }
        });
    }

    let store = Arc::new(SqliteSnapshotStore::connect(&config.database_url).await?);
    let builder = SnapshotBuilder::new(orchestrator, Arc::clone(&prices), universe)
        .with_concurrency(config.worker_concurrency)
        .with_cancel_flag(cancel);
    let machine = TimeMachine::new(builder, store);

    let dates = config.cadence.dates(config.start, config.end);
    tracing::info!(
        "Backtest {} to {}: {} {} snapshots{}",
        config.start,
        config.end,
        dates.len(),
        config.cadence,
        if config.force_rebuild { " (force rebuild)" } else { "" }
    );

    let snapshots = machine
        .build_series(&dates, config.force_rebuild)
        .await
        .context("snapshot series did not complete; rerun to resume from the first missing date")?;

    let engine = BacktestEngine::new(BacktestConfig {
        price_concurrency: config.worker_concurrency,
        ..BacktestConfig::default()
    });
    let run = engine.simulate_all(&snapshots, prices.as_ref()).await;
    let report = BacktestReport::build(&snapshots, &run, engine.config().equity_convention);

    tracing::info!(
        "Trades: {} completed, {} incomplete, {} invalid",
        run.summary.succeeded,
        run.summary.incomplete,
        run.summary.invalid
    );
    if let Some(win_rate) = report.global.win_rate {
        tracing::info!(
            "Win rate {:.1}%, final equity {:.4}",
            win_rate * 100.0,
            report.final_equity
        );
    } else {
        tracing::info!("No completed trades in range");
    }

    println!("{}", report.to_json()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_mode_parsing() {
        assert!(matches!(Mode::from_args(&args(&[])).unwrap(), Mode::Backtest));
        assert!(matches!(Mode::from_args(&args(&["backtest"])).unwrap(), Mode::Backtest));

        match Mode::from_args(&args(&["rank", "2025-06-01"])).unwrap() {
            Mode::Rank { as_of } => assert_eq!(as_of, NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()),
            Mode::Backtest => panic!("expected rank mode"),
        }

        assert!(Mode::from_args(&args(&["rank", "June"])).is_err());
        assert!(Mode::from_args(&args(&["replay"])).is_err());
    }
}
