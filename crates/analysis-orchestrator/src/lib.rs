pub mod bonus;
pub mod cache;
pub mod registry;
pub mod resilience;
pub mod scoring;
pub mod screener;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use analysis_core::point_in_time::validate_dimension_score;
use analysis_core::{AnalysisError, CompositeScore, Dimension, DimensionProvider, DimensionScore};
use chrono::NaiveDate;
use futures_util::future::join_all;
use serde::Serialize;

pub use cache::{CacheKey, CacheStats, ProviderCache};
pub use registry::ProviderRegistry;
pub use resilience::ResiliencePolicy;
pub use scoring::{CompositeScorer, ScoringWeights, NEUTRAL_SCORE};
pub use screener::{RankingResult, Screener, ScreenerFilters};

/// A dimension that fell back to the neutral default, and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DegradedDimension {
    pub dimension: Dimension,
    pub provider: String,
    pub reason: String,
}

/// Raw provider answers for one instrument and date.
#[derive(Debug, Clone, Default)]
pub struct GatheredScores {
    pub scores: Vec<DimensionScore>,
    pub degraded: Vec<DegradedDimension>,
}

#[derive(Debug, Clone)]
pub struct InstrumentAnalysis {
    pub score: CompositeScore,
    pub degraded: Vec<DegradedDimension>,
}

/// Runs every registered provider for an (instrument, as-of) pair through the
/// shared cache and resilience policy, then scores the result.
pub struct AnalysisOrchestrator {
    registry: ProviderRegistry,
    cache: Arc<ProviderCache>,
    policy: ResiliencePolicy,
    scorer: CompositeScorer,
}

impl AnalysisOrchestrator {
    pub fn new(
        registry: ProviderRegistry,
        cache: Arc<ProviderCache>,
        policy: ResiliencePolicy,
        scorer: CompositeScorer,
    ) -> Self {
        Self {
            registry,
            cache,
            policy,
            scorer,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &Arc<ProviderCache> {
        &self.cache
    }

    pub fn scorer(&self) -> &CompositeScorer {
        &self.scorer
    }

    /// Ask every provider concurrently.
    ///
    /// Unavailable, timed-out and failing providers degrade their dimension.
    /// Any other provider error is returned for the whole instrument.
    pub async fn gather(&self, instrument_id: &str, as_of: NaiveDate) -> Result<GatheredScores, AnalysisError> {
        let calls = self.registry.providers().map(|provider| async move {
            let result = self.fetch(provider.as_ref(), instrument_id, as_of).await;
            (provider, result)
        });
        let results = join_all(calls).await;

        let mut gathered = GatheredScores::default();
        for (provider, result) in results {
            match result {
                Ok(score) if score.dimension != provider.dimension() => {
                    return Err(AnalysisError::ComputationError(format!(
                        "{} returned a {} score for {}",
                        provider.name(),
                        score.dimension,
                        instrument_id
                    )));
                }
                Ok(score) => gathered.scores.push(score),
                Err(e) if e.is_degradable() => {
                    tracing::warn!(
                        "{} degraded for {} as of {}: {}",
                        provider.dimension(),
                        instrument_id,
                        as_of,
                        e
                    );
                    gathered.degraded.push(DegradedDimension {
                        dimension: provider.dimension(),
                        provider: provider.name().to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
        Ok(gathered)
    }

    /// Gather, check every datum against `as_of`, and score.
    pub async fn analyze(&self, instrument_id: &str, as_of: NaiveDate) -> Result<InstrumentAnalysis, AnalysisError> {
        let gathered = self.gather(instrument_id, as_of).await?;
        for score in &gathered.scores {
            validate_dimension_score(score, as_of)?;
        }
        let score = self.scorer.score(instrument_id, as_of, &gathered.scores)?;
        Ok(InstrumentAnalysis {
            score,
            degraded: gathered.degraded,
        })
    }

    async fn fetch(
        &self,
        provider: &dyn DimensionProvider,
        instrument_id: &str,
        as_of: NaiveDate,
    ) -> Result<DimensionScore, AnalysisError> {
        let key = CacheKey::new(instrument_id, provider.name(), as_of);
        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        let result = self
            .policy
            .call(provider.name(), || provider.get_score(instrument_id, as_of))
            .await;
        self.cache.insert(key, &result);
        result
    }
}
