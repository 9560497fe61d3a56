use std::sync::Arc;

use analysis_core::{AnalysisError, CatalystKind, Dimension, DimensionProvider, DimensionScore, Evidence};
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::HistoricalDataset;

/// Transactions older than this (by filing date) no longer count.
const RECENCY_WINDOW_DAYS: i64 = 180;
const SALE_WEIGHT: f64 = 0.5;
const POINTS_PER_UNIT: f64 = 20.0;

/// Insider-activity recency: recent open-market purchases score high, sales
/// pull the score down, and everything fades linearly over the window.
pub struct InsiderProvider {
    dataset: Arc<HistoricalDataset>,
}

impl InsiderProvider {
    pub fn new(dataset: Arc<HistoricalDataset>) -> Self {
        Self { dataset }
    }
}

#[async_trait]
impl DimensionProvider for InsiderProvider {
    fn name(&self) -> &str {
        "insider-recency"
    }

    fn dimension(&self) -> Dimension {
        Dimension::Insider
    }

    async fn get_score(&self, instrument_id: &str, as_of: NaiveDate) -> Result<DimensionScore, AnalysisError> {
        let history = self
            .dataset
            .instrument(instrument_id)
            .ok_or_else(|| AnalysisError::unavailable(instrument_id, self.name(), as_of))?;

        let public: Vec<_> = history
            .insider_transactions
            .iter()
            .filter(|t| t.filed_on <= as_of)
            .collect();
        // No filings at all yet: nothing to say, as opposed to "quiet insiders".
        let latest_filing = public
            .last()
            .map(|t| t.filed_on)
            .ok_or_else(|| AnalysisError::unavailable(instrument_id, self.name(), as_of))?;

        let mut net = 0.0;
        let mut evidence = Vec::new();
        for tx in &public {
            let age = (as_of - tx.filed_on).num_days();
            if age > RECENCY_WINDOW_DAYS {
                continue;
            }
            let fade = 1.0 - age as f64 / RECENCY_WINDOW_DAYS as f64;
            if tx.is_purchase {
                net += fade;
                evidence.push(Evidence::Catalyst {
                    kind: CatalystKind::InsiderBuy,
                    occurred_on: tx.filed_on,
                    description: format!("{} bought {:.0} shares", tx.insider, tx.shares),
                });
            } else {
                net -= fade * SALE_WEIGHT;
            }
        }

        let value = (50.0 + net * POINTS_PER_UNIT).clamp(0.0, 100.0);
        let mut score = DimensionScore::new(instrument_id, Dimension::Insider, value, latest_filing)?;
        score.evidence = evidence;
        Ok(score)
    }
}
