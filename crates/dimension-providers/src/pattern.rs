//! Pattern quality from daily closes.
//!
//! Classifies the current price structure into a base stage and scores it,
//! adjusted by trailing relative strength.

use std::sync::Arc;

use analysis_core::stats::mean;
use analysis_core::{AnalysisError, BaseStage, Dimension, DimensionProvider, DimensionScore, Evidence};
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::HistoricalDataset;

/// Minimum closes needed before a stage can be classified.
const MIN_OBSERVATIONS: usize = 60;
const SMA_LEN: usize = 50;
const SMA_SLOPE_LAG: usize = 10;
const PRIOR_HIGH_LOOKBACK: usize = 40;
const BASE_LOOKBACK: usize = 30;
const EARLY_BASE_MAX_DEPTH: f64 = 0.12;
const EXTENDED_ABOVE_SMA: f64 = 1.20;
const STRENGTH_LOOKBACK: usize = 120;

pub struct PatternProvider {
    dataset: Arc<HistoricalDataset>,
}

impl PatternProvider {
    pub fn new(dataset: Arc<HistoricalDataset>) -> Self {
        Self { dataset }
    }
}

/// Stage of a close series (oldest first). Requires at least `MIN_OBSERVATIONS`.
pub fn classify_stage(closes: &[f64]) -> BaseStage {
    let n = closes.len();
    let last = closes[n - 1];
    let sma = mean(&closes[n - SMA_LEN..]);
    let sma_prev = mean(&closes[n - SMA_LEN - SMA_SLOPE_LAG..n - SMA_SLOPE_LAG]);
    let prior_high = closes[n - 1 - PRIOR_HIGH_LOOKBACK..n - 1]
        .iter()
        .cloned()
        .fold(f64::MIN, f64::max);

    let base = &closes[n - BASE_LOOKBACK..];
    let base_high = base.iter().cloned().fold(f64::MIN, f64::max);
    let base_low = base.iter().cloned().fold(f64::MAX, f64::min);
    let depth = (base_high - base_low) / base_high;

    if last < sma && sma < sma_prev {
        BaseStage::Downtrend
    } else if last > sma * EXTENDED_ABOVE_SMA {
        BaseStage::Extended
    } else if last >= prior_high {
        BaseStage::Breakout
    } else if depth <= EARLY_BASE_MAX_DEPTH {
        BaseStage::EarlyBase
    } else {
        BaseStage::LateBase
    }
}

fn stage_points(stage: BaseStage) -> f64 {
    match stage {
        BaseStage::Breakout => 85.0,
        BaseStage::EarlyBase => 75.0,
        BaseStage::LateBase => 60.0,
        BaseStage::Extended => 50.0,
        BaseStage::Downtrend => 20.0,
    }
}

/// Stage score plus a relative-strength adjustment of at most 15 points.
pub fn pattern_score(closes: &[f64]) -> (BaseStage, f64) {
    let stage = classify_stage(closes);
    let n = closes.len();
    let anchor = closes[n - n.min(STRENGTH_LOOKBACK)];
    let trailing_return = closes[n - 1] / anchor - 1.0;
    let strength = (trailing_return * 50.0).clamp(-15.0, 15.0);
    (stage, (stage_points(stage) + strength).clamp(0.0, 100.0))
}

#[async_trait]
impl DimensionProvider for PatternProvider {
    fn name(&self) -> &str {
        "pattern-stage"
    }

    fn dimension(&self) -> Dimension {
        Dimension::Pattern
    }

    async fn get_score(&self, instrument_id: &str, as_of: NaiveDate) -> Result<DimensionScore, AnalysisError> {
        let history = self
            .dataset
            .instrument(instrument_id)
            .ok_or_else(|| AnalysisError::unavailable(instrument_id, self.name(), as_of))?;

        let visible = history.prices_as_of(as_of);
        if visible.len() < MIN_OBSERVATIONS {
            tracing::debug!(
                "{} has {} closes as of {}, need {}",
                instrument_id,
                visible.len(),
                as_of,
                MIN_OBSERVATIONS
            );
            return Err(AnalysisError::unavailable(instrument_id, self.name(), as_of));
        }
        if let Some(bad) = visible.iter().find(|p| !(p.price > 0.0) || !p.price.is_finite()) {
            return Err(AnalysisError::ComputationError(format!(
                "non-positive close for {} on {}: {}",
                instrument_id, bad.date, bad.price
            )));
        }

        let closes: Vec<f64> = visible.iter().map(|p| p.price).collect();
        let (stage, value) = pattern_score(&closes);
        let last_date = visible[visible.len() - 1].date;

        Ok(DimensionScore::new(instrument_id, Dimension::Pattern, value, last_date)?
            .with_evidence(Evidence::BaseStage {
                stage,
                observed_on: last_date,
            }))
    }
}
