//! Composite scoring: weighted base score, additive bonuses, tier.

use std::collections::BTreeMap;

use analysis_core::{AnalysisError, CompositeScore, Dimension, DimensionScore, DimensionValue};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::bonus;

/// Value used for a dimension whose provider could not answer.
pub const NEUTRAL_SCORE: f64 = 50.0;

const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Per-dimension weights. Always non-negative and summing to 1.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    weights: BTreeMap<Dimension, f64>,
}

impl ScoringWeights {
    /// Dimensions left out of `weights` get weight 0.
    pub fn new(weights: BTreeMap<Dimension, f64>) -> Result<Self, AnalysisError> {
        if let Some((dim, w)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(AnalysisError::ConfigError(format!("invalid weight for {dim}: {w}")));
        }
        let total: f64 = weights.values().sum();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(AnalysisError::ConfigError(format!(
                "dimension weights must sum to 1.0, got {total}"
            )));
        }
        Ok(Self { weights })
    }

    pub fn weight(&self, dimension: Dimension) -> f64 {
        self.weights.get(&dimension).copied().unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }
}

impl Default for ScoringWeights {
    /// Pattern 30%, insider 25%, sector 20%, institutional 25%.
    /// Fundamental is reported but not weighted.
    fn default() -> Self {
        let weights = BTreeMap::from([
            (Dimension::Pattern, 0.30),
            (Dimension::Insider, 0.25),
            (Dimension::Sector, 0.20),
            (Dimension::Institutional, 0.25),
            (Dimension::Fundamental, 0.0),
        ]);
        Self { weights }
    }
}

/// Merges dimension scores into a [`CompositeScore`]. Pure and deterministic.
#[derive(Debug, Clone, Default)]
pub struct CompositeScorer {
    weights: ScoringWeights,
}

impl CompositeScorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ScoringWeights {
        &self.weights
    }

    pub fn base_score(&self, values: &BTreeMap<Dimension, DimensionValue>) -> f64 {
        Dimension::ALL
            .iter()
            .map(|dim| {
                let value = values.get(dim).map(|v| v.value).unwrap_or(NEUTRAL_SCORE);
                self.weights.weight(*dim) * value
            })
            .sum()
    }

    /// Score one instrument from whatever dimension scores were obtained.
    ///
    /// Every dimension absent from `scores` is recorded as degraded at
    /// [`NEUTRAL_SCORE`]. Scores for another instrument, duplicate dimensions
    /// and out-of-range values are computation errors.
    pub fn score(
        &self,
        instrument_id: &str,
        as_of: NaiveDate,
        scores: &[DimensionScore],
    ) -> Result<CompositeScore, AnalysisError> {
        let mut values = BTreeMap::new();
        for score in scores {
            if score.instrument_id != instrument_id {
                return Err(AnalysisError::ComputationError(format!(
                    "{} score for {} passed while scoring {}",
                    score.dimension, score.instrument_id, instrument_id
                )));
            }
            if !score.value.is_finite() || !(0.0..=100.0).contains(&score.value) {
                return Err(AnalysisError::ComputationError(format!(
                    "{} score for {} out of range: {}",
                    score.dimension, instrument_id, score.value
                )));
            }
            let value = DimensionValue {
                value: score.value,
                degraded: false,
                data_as_of: Some(score.data_as_of),
            };
            if values.insert(score.dimension, value).is_some() {
                return Err(AnalysisError::ComputationError(format!(
                    "duplicate {} score for {}",
                    score.dimension, instrument_id
                )));
            }
        }
        for dim in Dimension::ALL {
            values.entry(dim).or_insert(DimensionValue {
                value: NEUTRAL_SCORE,
                degraded: true,
                data_as_of: None,
            });
        }

        let base = self.base_score(&values);
        let reasons = bonus::evaluate(as_of, scores);
        CompositeScore::new(instrument_id, as_of, values, base, reasons)
    }
}
