use analysis_core::{BonusKind, RunSummary, Tier};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Calendar-day holding period per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldSchedule {
    pub legendary: i64,
    pub epic: i64,
    pub excellent: i64,
    pub good: i64,
    pub moderate: i64,
    /// Extra days when the timing-convergence bonus fired
    pub timing_extension: i64,
}

impl Default for HoldSchedule {
    fn default() -> Self {
        Self {
            legendary: 90,
            epic: 60,
            excellent: 45,
            good: 30,
            moderate: 20,
            timing_extension: 15,
        }
    }
}

impl HoldSchedule {
    pub fn days_for(&self, tier: Tier, timing_bonus: bool) -> i64 {
        let base = match tier {
            Tier::Legendary => self.legendary,
            Tier::Epic => self.epic,
            Tier::Excellent => self.excellent,
            Tier::Good => self.good,
            Tier::Moderate => self.moderate,
        };
        if timing_bonus {
            base + self.timing_extension
        } else {
            base
        }
    }
}

/// How trade returns accumulate into the equity curve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquityConvention {
    /// Product of (1 + return)
    #[default]
    Compounded,
    /// 1 + sum of returns
    Additive,
}

/// Configuration for a backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub hold: HoldSchedule,
    /// Concurrent price-history requests
    pub price_concurrency: usize,
    pub equity_convention: EquityConvention,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            hold: HoldSchedule::default(),
            price_concurrency: 8,
            equity_convention: EquityConvention::Compounded,
        }
    }
}

/// One simulated position: entered at the snapshot price, held for the
/// tier's horizon, exited at the close on (or nearest before) the exit date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub instrument_id: String,
    pub snapshot_date: NaiveDate,
    pub entry_price: f64,
    pub tier: Tier,
    pub final_score: f64,
    pub bonus_flags: Vec<BonusKind>,
    pub hold_days: i64,
    pub scheduled_exit_date: NaiveDate,
    /// Date of the observation actually used for the exit
    pub exit_date: NaiveDate,
    /// True when the scheduled exit date had no observation
    pub exit_adjusted: bool,
    pub exit_price: f64,
    pub return_pct: f64,
    /// Worst peak-to-trough decline inside the window, as a positive percentage
    pub max_drawdown_pct: f64,
    pub max_gain_pct: f64,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.return_pct > 0.0
    }

    pub fn has_timing_bonus(&self) -> bool {
        self.bonus_flags.contains(&BonusKind::TimingConvergence)
    }
}

/// Completed trades plus counts of what was excluded and why.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationRun {
    pub trades: Vec<Trade>,
    pub summary: RunSummary,
}

impl SimulationRun {
    pub fn merge(&mut self, other: SimulationRun) {
        self.trades.extend(other.trades);
        self.summary.merge(other.summary);
        sort_trades(&mut self.trades);
    }
}

/// Entry date, then instrument.
pub(crate) fn sort_trades(trades: &mut [Trade]) {
    trades.sort_by(|a, b| {
        a.snapshot_date
            .cmp(&b.snapshot_date)
            .then_with(|| a.instrument_id.cmp(&b.instrument_id))
    });
}

/// Descriptive statistics over a set of completed trades.
///
/// With zero trades every statistic is `None` ("no data").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub scope: String,
    pub trade_count: usize,
    /// Fraction of trades with a positive return (0.0 - 1.0)
    pub win_rate: Option<f64>,
    pub avg_return: Option<f64>,
    pub median_return: Option<f64>,
    pub return_std_dev: Option<f64>,
    pub best_trade: Option<f64>,
    pub worst_trade: Option<f64>,
    pub avg_hold_days: Option<f64>,
    pub avg_max_drawdown: Option<f64>,
}

impl MetricsReport {
    pub fn has_data(&self) -> bool {
        self.trade_count > 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grouping {
    Global,
    Tier,
    TimingBonus,
}

/// Trades with and without the timing-convergence bonus, side by side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BonusComparison {
    pub with_bonus: MetricsReport,
    pub without_bonus: MetricsReport,
    /// with - without, when both sides have data
    pub win_rate_lift: Option<f64>,
    pub avg_return_lift: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub instrument_id: String,
    pub return_pct: f64,
    pub equity: f64,
}
