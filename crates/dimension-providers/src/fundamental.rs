use std::sync::Arc;

use analysis_core::stats::{mean, scale_to_score};
use analysis_core::{AnalysisError, Dimension, DimensionProvider, DimensionScore, Evidence};
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{FundamentalReport, HistoricalDataset};

/// Published catalysts older than this are not surfaced as evidence.
const CATALYST_WINDOW_DAYS: i64 = 180;

/// Fundamental quality from the latest published report, plus any recent
/// published catalysts (earnings surprises, analyst upgrades).
pub struct FundamentalProvider {
    dataset: Arc<HistoricalDataset>,
}

impl FundamentalProvider {
    pub fn new(dataset: Arc<HistoricalDataset>) -> Self {
        Self { dataset }
    }
}

/// Equal-weight blend of growth, profitability and leverage sub-scores.
pub fn quality_score(report: &FundamentalReport) -> Result<f64, AnalysisError> {
    let inputs = [
        report.revenue_growth_pct,
        report.eps_growth_pct,
        report.return_on_equity_pct,
        report.debt_to_equity,
    ];
    if inputs.iter().any(|x| !x.is_finite()) {
        return Err(AnalysisError::ComputationError(format!(
            "non-finite fundamentals published {}",
            report.published_on
        )));
    }

    Ok(mean(&[
        scale_to_score(report.revenue_growth_pct, -10.0, 30.0),
        scale_to_score(report.eps_growth_pct, -20.0, 40.0),
        scale_to_score(report.return_on_equity_pct, 0.0, 30.0),
        scale_to_score(-report.debt_to_equity, -3.0, 0.0),
    ]))
}

#[async_trait]
impl DimensionProvider for FundamentalProvider {
    fn name(&self) -> &str {
        "fundamental-quality"
    }

    fn dimension(&self) -> Dimension {
        Dimension::Fundamental
    }

    async fn get_score(&self, instrument_id: &str, as_of: NaiveDate) -> Result<DimensionScore, AnalysisError> {
        let history = self
            .dataset
            .instrument(instrument_id)
            .ok_or_else(|| AnalysisError::unavailable(instrument_id, self.name(), as_of))?;

        let report = history
            .fundamentals
            .iter()
            .rev()
            .find(|r| r.published_on <= as_of)
            .ok_or_else(|| AnalysisError::unavailable(instrument_id, self.name(), as_of))?;

        let mut score = DimensionScore::new(
            instrument_id,
            Dimension::Fundamental,
            quality_score(report)?,
            report.published_on,
        )?;

        score.evidence = history
            .events
            .iter()
            .filter(|e| e.published_on <= as_of)
            .filter(|e| (as_of - e.published_on).num_days() <= CATALYST_WINDOW_DAYS)
            .map(|e| Evidence::Catalyst {
                kind: e.kind,
                occurred_on: e.published_on,
                description: e.description.clone(),
            })
            .collect();

        Ok(score)
    }
}
