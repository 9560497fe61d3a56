use std::sync::Arc;

use analysis_core::stats::scale_to_score;
use analysis_core::{AnalysisError, CatalystKind, Dimension, DimensionProvider, DimensionScore, Evidence};
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::HistoricalDataset;

/// Ownership increase (percentage points, filing over filing) that counts as accumulation.
const ACCUMULATION_THRESHOLD: f64 = 2.0;
const LEVEL_WEIGHT: f64 = 0.6;
const CHANGE_WEIGHT: f64 = 0.4;

/// Institutional ownership: level of ownership plus its latest change.
pub struct InstitutionalProvider {
    dataset: Arc<HistoricalDataset>,
}

impl InstitutionalProvider {
    pub fn new(dataset: Arc<HistoricalDataset>) -> Self {
        Self { dataset }
    }
}

#[async_trait]
impl DimensionProvider for InstitutionalProvider {
    fn name(&self) -> &str {
        "institutional-ownership"
    }

    fn dimension(&self) -> Dimension {
        Dimension::Institutional
    }

    async fn get_score(&self, instrument_id: &str, as_of: NaiveDate) -> Result<DimensionScore, AnalysisError> {
        let history = self
            .dataset
            .instrument(instrument_id)
            .ok_or_else(|| AnalysisError::unavailable(instrument_id, self.name(), as_of))?;

        let public: Vec<_> = history
            .institutional_filings
            .iter()
            .filter(|f| f.filed_on <= as_of)
            .collect();
        let latest = *public
            .last()
            .ok_or_else(|| AnalysisError::unavailable(instrument_id, self.name(), as_of))?;

        if !latest.ownership_pct.is_finite() || !(0.0..=100.0).contains(&latest.ownership_pct) {
            return Err(AnalysisError::ComputationError(format!(
                "ownership for {} filed {} out of range: {}",
                instrument_id, latest.filed_on, latest.ownership_pct
            )));
        }

        let change = public
            .len()
            .checked_sub(2)
            .map(|i| latest.ownership_pct - public[i].ownership_pct)
            .unwrap_or(0.0);

        let value = LEVEL_WEIGHT * scale_to_score(latest.ownership_pct, 10.0, 90.0)
            + CHANGE_WEIGHT * scale_to_score(change, -5.0, 5.0);

        let mut score = DimensionScore::new(instrument_id, Dimension::Institutional, value, latest.filed_on)?;
        if change >= ACCUMULATION_THRESHOLD {
            score = score.with_evidence(Evidence::Catalyst {
                kind: CatalystKind::InstitutionalAccumulation,
                occurred_on: latest.filed_on,
                description: format!(
                    "ownership up {:.1}pts to {:.1}% across {} holders",
                    change, latest.ownership_pct, latest.holder_count
                ),
            });
        }
        Ok(score)
    }
}
