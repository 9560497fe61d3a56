use std::sync::Arc;

use analysis_core::{AnalysisError, PriceLookup, PricePoint};
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::HistoricalDataset;

/// [`PriceLookup`] over the dataset's daily closes.
pub struct DatasetPriceLookup {
    dataset: Arc<HistoricalDataset>,
}

impl DatasetPriceLookup {
    pub fn new(dataset: Arc<HistoricalDataset>) -> Self {
        Self { dataset }
    }
}

#[async_trait]
impl PriceLookup for DatasetPriceLookup {
    async fn get_price(&self, instrument_id: &str, date: NaiveDate) -> Result<PricePoint, AnalysisError> {
        self.dataset
            .instrument(instrument_id)
            .and_then(|h| h.prices_as_of(date).last())
            .cloned()
            .ok_or_else(|| AnalysisError::unavailable(instrument_id, "price", date))
    }

    async fn get_price_series(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, AnalysisError> {
        let history = self
            .dataset
            .instrument(instrument_id)
            .ok_or_else(|| AnalysisError::unavailable(instrument_id, "price", end))?;
        Ok(history
            .prices_as_of(end)
            .iter()
            .filter(|p| p.date >= start)
            .cloned()
            .collect())
    }

    async fn history_end(&self, instrument_id: &str) -> Result<Option<NaiveDate>, AnalysisError> {
        Ok(self
            .dataset
            .instrument(instrument_id)
            .and_then(|h| h.prices.last())
            .map(|p| p.date))
    }
}
