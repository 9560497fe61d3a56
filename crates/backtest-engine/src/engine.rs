use std::sync::Arc;

use analysis_core::{AnalysisError, BonusKind, PriceLookup, PricePoint, Snapshot, SnapshotEntry};
use chrono::{Duration, NaiveDate};
use futures_util::stream::{self, StreamExt};
use rayon::prelude::*;

use crate::models::*;

/// Replays snapshot entries as fixed-horizon trades against forward prices.
///
/// Price I/O runs concurrently (bounded by `price_concurrency`); the per-trade
/// arithmetic is a pure function fanned out with rayon. Output order depends
/// only on the inputs, so repeated runs against the same history are identical.
pub struct BacktestEngine {
    config: BacktestConfig,
}

/// Price data fetched for one entry before simulation.
struct PriceWindow {
    history_end: Result<Option<NaiveDate>, AnalysisError>,
    window: Result<Vec<PricePoint>, AnalysisError>,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Simulate every entry of one snapshot.
    pub async fn simulate(&self, snapshot: &Snapshot, prices: &dyn PriceLookup) -> SimulationRun {
        let snapshot_date = snapshot.snapshot_date;
        let hold = self.config.hold;

        // `buffered` keeps input order while up to N fetches are in flight
        let windows: Vec<PriceWindow> = stream::iter(snapshot.entries.iter())
            .map(|entry| fetch_window(prices, entry, snapshot_date, &hold))
            .buffered(self.config.price_concurrency.max(1))
            .collect()
            .await;

        let outcomes: Vec<Result<Trade, AnalysisError>> = snapshot
            .entries
            .par_iter()
            .zip(windows.par_iter())
            .map(|(entry, fetched)| match (&fetched.history_end, &fetched.window) {
                (Ok(history_end), Ok(window)) => simulate_entry(entry, snapshot_date, &hold, window, *history_end),
                // a failed lookup is invalid, never "incomplete"
                (Err(e), _) | (_, Err(e)) => Err(e.clone()),
            })
            .collect();

        let mut run = SimulationRun::default();
        for (entry, outcome) in snapshot.entries.iter().zip(outcomes) {
            let instrument_id = entry.instrument_id();
            match outcome {
                Ok(trade) => {
                    run.summary.record_success();
                    run.trades.push(trade);
                }
                Err(e @ AnalysisError::IncompleteTrade { .. }) => {
                    tracing::info!("Incomplete trade {} from {}: {}", instrument_id, snapshot_date, e);
                    run.summary.record_incomplete(instrument_id, e.to_string());
                }
                Err(e) => {
                    tracing::warn!("Invalid trade {} from {}: {}", instrument_id, snapshot_date, e);
                    run.summary.record_invalid(instrument_id, e.to_string());
                }
            }
        }

        sort_trades(&mut run.trades);
        run.summary.sort_issues();
        tracing::info!(
            "Simulated {} snapshot: {} trades, {} incomplete, {} invalid",
            snapshot_date,
            run.trades.len(),
            run.summary.incomplete,
            run.summary.invalid
        );
        run
    }

    /// Simulate a series of snapshots and merge the outcomes.
    pub async fn simulate_all(&self, snapshots: &[Arc<Snapshot>], prices: &dyn PriceLookup) -> SimulationRun {
        let mut combined = SimulationRun::default();
        for snapshot in snapshots {
            let run = self.simulate(snapshot, prices).await;
            combined.merge(run);
        }
        combined
    }
}

async fn fetch_window(
    prices: &dyn PriceLookup,
    entry: &SnapshotEntry,
    snapshot_date: NaiveDate,
    hold: &HoldSchedule,
) -> PriceWindow {
    let instrument_id = entry.instrument_id();
    let timing = entry.score.has_bonus(BonusKind::TimingConvergence);
    let exit = snapshot_date + Duration::days(hold.days_for(entry.score.tier(), timing));

    let (history_end, window) = futures_util::join!(
        prices.history_end(instrument_id),
        prices.get_price_series(instrument_id, snapshot_date, exit)
    );

    PriceWindow { history_end, window }
}

/// Turn one snapshot entry and its forward price window into a trade.
///
/// `window` holds observations from the snapshot date through the scheduled
/// exit, oldest first. `history_end` is the last date the price source covers.
pub fn simulate_entry(
    entry: &SnapshotEntry,
    snapshot_date: NaiveDate,
    hold: &HoldSchedule,
    window: &[PricePoint],
    history_end: Option<NaiveDate>,
) -> Result<Trade, AnalysisError> {
    let instrument_id = entry.instrument_id();

    let entry_price = match entry.entry_price {
        Some(p) if p.is_finite() && p > 0.0 => p,
        Some(p) => {
            return Err(AnalysisError::ComputationError(format!(
                "{instrument_id}: non-positive entry price {p}"
            )))
        }
        None => {
            return Err(AnalysisError::ComputationError(format!(
                "{instrument_id}: no entry price"
            )))
        }
    };

    let timing = entry.score.has_bonus(BonusKind::TimingConvergence);
    let hold_days = hold.days_for(entry.score.tier(), timing);
    let scheduled_exit_date = snapshot_date + Duration::days(hold_days);

    if history_end.map_or(true, |end| end < scheduled_exit_date) {
        return Err(AnalysisError::IncompleteTrade {
            instrument_id: instrument_id.to_string(),
            exit_date: scheduled_exit_date,
            history_end,
        });
    }

    let held: Vec<&PricePoint> = window
        .iter()
        .filter(|p| p.date >= snapshot_date && p.date <= scheduled_exit_date)
        .collect();

    if let Some(bad) = held.iter().find(|p| !p.price.is_finite() || p.price <= 0.0) {
        return Err(AnalysisError::ComputationError(format!(
            "{instrument_id}: non-positive price {} on {}",
            bad.price, bad.date
        )));
    }

    // nearest observation on or before the scheduled exit
    let exit = held.last().ok_or_else(|| {
        AnalysisError::ComputationError(format!(
            "{instrument_id}: no price between {snapshot_date} and {scheduled_exit_date}"
        ))
    })?;

    let mut peak = entry_price;
    let mut max_drawdown_pct: f64 = 0.0;
    let mut high = entry_price;
    for point in &held {
        peak = peak.max(point.price);
        high = high.max(point.price);
        max_drawdown_pct = max_drawdown_pct.max((peak - point.price) / peak * 100.0);
    }

    Ok(Trade {
        instrument_id: instrument_id.to_string(),
        snapshot_date,
        entry_price,
        tier: entry.score.tier(),
        final_score: entry.score.final_score(),
        bonus_flags: entry.score.bonus_flags(),
        hold_days,
        scheduled_exit_date,
        exit_date: exit.date,
        exit_adjusted: exit.date != scheduled_exit_date,
        exit_price: exit.price,
        return_pct: (exit.price / entry_price - 1.0) * 100.0,
        max_drawdown_pct,
        max_gain_pct: (high / entry_price - 1.0) * 100.0,
    })
}
