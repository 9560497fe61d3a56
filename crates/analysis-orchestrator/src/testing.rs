use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use analysis_core::{AnalysisError, Dimension, DimensionProvider, DimensionScore, Evidence};
use async_trait::async_trait;
use chrono::NaiveDate;

/// Scripted provider: a constant value stamped relative to the as-of date,
/// or a constant error, optionally after a delay.
pub struct FixedProvider {
    dimension: Dimension,
    value: f64,
    stamp_offset_days: i64,
    evidence: Vec<Evidence>,
    error: Option<AnalysisError>,
    delay: Option<Duration>,
    calls: AtomicU32,
}

impl FixedProvider {
    pub fn new(dimension: Dimension, value: f64) -> Self {
        Self {
            dimension,
            value,
            stamp_offset_days: -1,
            evidence: Vec::new(),
            error: None,
            delay: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(dimension: Dimension, error: AnalysisError) -> Self {
        Self { error: Some(error), ..Self::new(dimension, 0.0) }
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence.push(evidence);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DimensionProvider for FixedProvider {
    fn name(&self) -> &str {
        self.dimension.as_str()
    }

    fn dimension(&self) -> Dimension {
        self.dimension
    }

    async fn get_score(&self, instrument_id: &str, as_of: NaiveDate) -> Result<DimensionScore, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let mut score = DimensionScore::new(
            instrument_id,
            self.dimension,
            self.value,
            as_of + chrono::Duration::days(self.stamp_offset_days),
        )?;
        score.evidence = self.evidence.clone();
        Ok(score)
    }
}
