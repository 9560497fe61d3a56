//! Backtest Engine
//!
//! Simulates fixed-horizon trades from point-in-time snapshots and reduces
//! the outcomes to per-tier and per-bonus statistics plus an equity curve.

pub mod engine;
pub mod equity;
pub mod metrics;
pub mod models;
pub mod report;


pub use engine::{simulate_entry, BacktestEngine};
pub use equity::equity_curve;
pub use metrics::{aggregate, aggregate_by, compare_bonus};
pub use models::*;
pub use report::BacktestReport;
