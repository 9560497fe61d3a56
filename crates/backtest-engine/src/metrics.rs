//! Trade statistics: global, per tier, and with/without the timing bonus.

use std::collections::BTreeMap;

use analysis_core::Tier;
use statrs::statistics::{Data, Median, Statistics};

use crate::models::*;

pub const GLOBAL_SCOPE: &str = "all";
pub const WITH_TIMING_BONUS: &str = "with_timing_bonus";
pub const WITHOUT_TIMING_BONUS: &str = "without_timing_bonus";

/// Statistics over `trades`. Incomplete and invalid trades never get here,
/// so every input is a completed trade.
pub fn aggregate(scope: &str, trades: &[Trade]) -> MetricsReport {
    if trades.is_empty() {
        return MetricsReport {
            scope: scope.to_string(),
            trade_count: 0,
            win_rate: None,
            avg_return: None,
            median_return: None,
            return_std_dev: None,
            best_trade: None,
            worst_trade: None,
            avg_hold_days: None,
            avg_max_drawdown: None,
        };
    }

    let n = trades.len() as f64;
    let returns: Vec<f64> = trades.iter().map(|t| t.return_pct).collect();
    let wins = trades.iter().filter(|t| t.is_win()).count();

    let std_dev = if returns.len() > 1 {
        Some(returns.iter().std_dev())
    } else {
        None
    };

    MetricsReport {
        scope: scope.to_string(),
        trade_count: trades.len(),
        win_rate: Some(wins as f64 / n),
        avg_return: Some(returns.iter().sum::<f64>() / n),
        median_return: Some(Data::new(returns.clone()).median()),
        return_std_dev: std_dev,
        best_trade: returns.iter().copied().reduce(f64::max),
        worst_trade: returns.iter().copied().reduce(f64::min),
        avg_hold_days: Some(trades.iter().map(|t| t.hold_days as f64).sum::<f64>() / n),
        avg_max_drawdown: Some(trades.iter().map(|t| t.max_drawdown_pct).sum::<f64>() / n),
    }
}

/// One report per group key. Tier grouping lists every tier, including the
/// ones with no trades, so gaps show up as "no data".
pub fn aggregate_by(trades: &[Trade], grouping: Grouping) -> BTreeMap<String, MetricsReport> {
    let mut reports = BTreeMap::new();
    match grouping {
        Grouping::Global => {
            reports.insert(GLOBAL_SCOPE.to_string(), aggregate(GLOBAL_SCOPE, trades));
        }
        Grouping::Tier => {
            for tier in Tier::ALL {
                let group: Vec<Trade> = trades.iter().filter(|t| t.tier == tier).cloned().collect();
                reports.insert(tier.as_str().to_string(), aggregate(tier.as_str(), &group));
            }
        }
        Grouping::TimingBonus => {
            let (with, without): (Vec<Trade>, Vec<Trade>) =
                trades.iter().cloned().partition(Trade::has_timing_bonus);
            reports.insert(WITH_TIMING_BONUS.to_string(), aggregate(WITH_TIMING_BONUS, &with));
            reports.insert(WITHOUT_TIMING_BONUS.to_string(), aggregate(WITHOUT_TIMING_BONUS, &without));
        }
    }
    reports
}

pub fn compare_bonus(trades: &[Trade]) -> BonusComparison {
    let (with, without): (Vec<Trade>, Vec<Trade>) = trades.iter().cloned().partition(Trade::has_timing_bonus);
    let with_bonus = aggregate(WITH_TIMING_BONUS, &with);
    let without_bonus = aggregate(WITHOUT_TIMING_BONUS, &without);

    let lift = |a: Option<f64>, b: Option<f64>| a.zip(b).map(|(a, b)| a - b);
    BonusComparison {
        win_rate_lift: lift(with_bonus.win_rate, without_bonus.win_rate),
        avg_return_lift: lift(with_bonus.avg_return, without_bonus.avg_return),
        with_bonus,
        without_bonus,
    }
}
