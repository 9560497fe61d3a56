use super::AnalysisOrchestrator;
use analysis_core::{CompositeScore, RunSummary, Tier};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Serialize)]
pub struct RankingResult {
    pub as_of: NaiveDate,
    pub entries: Vec<CompositeScore>,
    pub total_analyzed: usize,
    pub total_passed_filters: usize,
    pub summary: RunSummary,
}

#[derive(Debug, Clone)]
pub struct ScreenerFilters {
    pub min_final_score: f64,
    /// Worst tier still included (tiers order best first)
    pub min_tier: Option<Tier>,
    pub limit: usize,
}

impl Default for ScreenerFilters {
    fn default() -> Self {
        Self {
            min_final_score: 0.0,
            min_tier: None,
            limit: 25,
        }
    }
}

impl ScreenerFilters {
    fn accepts(&self, score: &CompositeScore) -> bool {
        score.final_score() >= self.min_final_score
            && self.min_tier.map_or(true, |min| score.tier() <= min)
    }
}

/// Live ranking of a universe: providers, then composite scorer, then sort.
pub struct Screener {
    orchestrator: Arc<AnalysisOrchestrator>,
}

impl Screener {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Score and rank `universe` as of `as_of`.
    ///
    /// Every instrument lands in the summary exactly once. "Degraded" means a
    /// registered provider failed and its dimension fell back to neutral; a
    /// dimension with no registered provider is a configuration choice and
    /// does not count.
    pub async fn rank(&self, universe: Vec<String>, as_of: NaiveDate, filters: ScreenerFilters) -> RankingResult {
        let total_analyzed = universe.len();
        tracing::info!("Ranking {} instruments as of {}", total_analyzed, as_of);

        let mut pending: BTreeSet<String> = universe.iter().cloned().collect();
        let mut tasks = JoinSet::new();
        for instrument_id in universe {
            let orchestrator = Arc::clone(&self.orchestrator);
            tasks.spawn(async move {
                let result = orchestrator.analyze(&instrument_id, as_of).await;
                (instrument_id, result)
            });
        }

        let mut summary = RunSummary::default();
        let mut entries = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            if let Ok((instrument_id, _)) = &joined {
                pending.remove(instrument_id);
            }
            match joined {
                Ok((instrument_id, Ok(analysis))) => {
                    if analysis.degraded.is_empty() {
                        summary.record_success();
                    } else {
                        let dims: Vec<String> =
                            analysis.degraded.iter().map(|d| d.dimension.to_string()).collect();
                        summary.record_degraded(&instrument_id, format!("neutral default for {}", dims.join(", ")));
                    }
                    if filters.accepts(&analysis.score) {
                        entries.push(analysis.score);
                    }
                }
                Ok((instrument_id, Err(e))) => {
                    tracing::warn!("Failed to score {}: {}", instrument_id, e);
                    summary.record_error(&instrument_id, &e);
                }
                Err(e) => {
                    tracing::error!("Task error: {}", e);
                }
            }
        }
        // tasks that panicked never reported back
        for instrument_id in pending {
            summary.record_invalid(&instrument_id, "scoring task failed");
        }
        summary.sort_issues();

        let total_passed_filters = entries.len();
        entries.sort_by(|a, b| {
            b.final_score()
                .partial_cmp(&a.final_score())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.instrument_id().cmp(b.instrument_id()))
        });
        entries.truncate(filters.limit);

        tracing::info!(
            "Ranking complete: {}/{} passed filters, returning top {}",
            total_passed_filters,
            total_analyzed,
            entries.len()
        );

        RankingResult {
            as_of,
            entries,
            total_analyzed,
            total_passed_filters,
            summary,
        }
    }
}
