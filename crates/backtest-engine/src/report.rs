use std::collections::BTreeMap;
use std::sync::Arc;

use analysis_core::{RunSummary, Snapshot};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::equity::{curve_drawdown_pct, equity_curve, final_equity};
use crate::metrics::{aggregate, aggregate_by, compare_bonus, GLOBAL_SCOPE};
use crate::models::*;

/// Everything a backtest run produced, ready to serialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub snapshot_count: usize,
    /// Snapshot-build outcomes (succeeded / degraded / rejected / invalid)
    pub snapshot_summary: RunSummary,
    /// Trade outcomes (succeeded / incomplete / invalid)
    pub trade_summary: RunSummary,
    pub global: MetricsReport,
    pub by_tier: BTreeMap<String, MetricsReport>,
    pub bonus_comparison: BonusComparison,
    pub equity_convention: EquityConvention,
    pub equity_curve: Vec<EquityPoint>,
    pub final_equity: f64,
    pub equity_drawdown_pct: f64,
    pub trades: Vec<Trade>,
}

impl BacktestReport {
    pub fn build(snapshots: &[Arc<Snapshot>], run: &SimulationRun, convention: EquityConvention) -> Self {
        let mut snapshot_summary = RunSummary::default();
        for snapshot in snapshots {
            snapshot_summary.merge(snapshot.summary.clone());
        }

        let curve = equity_curve(&run.trades, convention);

        Self {
            start: snapshots.iter().map(|s| s.snapshot_date).min(),
            end: snapshots.iter().map(|s| s.snapshot_date).max(),
            snapshot_count: snapshots.len(),
            snapshot_summary,
            trade_summary: run.summary.clone(),
            global: aggregate(GLOBAL_SCOPE, &run.trades),
            by_tier: aggregate_by(&run.trades, Grouping::Tier),
            bonus_comparison: compare_bonus(&run.trades),
            equity_convention: convention,
            final_equity: final_equity(&curve),
            equity_drawdown_pct: curve_drawdown_pct(&curve),
            equity_curve: curve,
            trades: run.trades.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
