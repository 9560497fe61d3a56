use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{AnalysisError, Dimension, DimensionScore, PricePoint};

/// Source of one analytical dimension.
///
/// `as_of` is a hard cutoff: implementations must only use data stamped on or
/// before it, and must return an error rather than fall back to newer data.
#[async_trait]
pub trait DimensionProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    fn dimension(&self) -> Dimension;

    async fn get_score(&self, instrument_id: &str, as_of: NaiveDate) -> Result<DimensionScore, AnalysisError>;
}

/// Historical daily price access.
#[async_trait]
pub trait PriceLookup: Send + Sync {
    /// Latest observation on or before `date`.
    async fn get_price(&self, instrument_id: &str, date: NaiveDate) -> Result<PricePoint, AnalysisError>;

    /// Observations in `[start, end]`, ascending by date.
    async fn get_price_series(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, AnalysisError>;

    /// Date of the newest observation held for the instrument.
    async fn history_end(&self, instrument_id: &str) -> Result<Option<NaiveDate>, AnalysisError>;
}
