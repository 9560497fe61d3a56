//! Point-in-time snapshot builder.
//!
//! Scores the whole universe as it would have looked on a past date. Every
//! provider and price call receives the as-of date, and every datum that comes
//! back is checked against it before it can enter the snapshot.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use analysis_core::point_in_time::validate_price;
use analysis_core::{AnalysisError, PriceLookup, RunSummary, Snapshot, SnapshotEntry};
use analysis_orchestrator::{AnalysisOrchestrator, DegradedDimension};
use chrono::NaiveDate;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use uuid::Uuid;

pub const DEFAULT_CONCURRENCY: usize = 8;

pub struct SnapshotBuilder {
    orchestrator: Arc<AnalysisOrchestrator>,
    prices: Arc<dyn PriceLookup>,
    universe: Vec<String>,
    concurrency: usize,
    cancel: Arc<AtomicBool>,
}

impl SnapshotBuilder {
    pub fn new(orchestrator: Arc<AnalysisOrchestrator>, prices: Arc<dyn PriceLookup>, mut universe: Vec<String>) -> Self {
        universe.sort();
        universe.dedup();
        Self {
            orchestrator,
            prices,
            universe,
            concurrency: DEFAULT_CONCURRENCY,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Share an external stop flag (e.g. set from a ctrl-c handler).
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn universe(&self) -> &[String] {
        &self.universe
    }

    /// Build the snapshot for `as_of`.
    ///
    /// Per-instrument failures are recorded in the snapshot's run summary and
    /// never abort the build. Only cancellation fails the whole call.
    /// An entry counts as degraded only when a registered provider failed;
    /// a dimension with no provider registered is not degradation.
    pub async fn build_snapshot(&self, as_of: NaiveDate) -> Result<Snapshot, AnalysisError> {
        let run_id = Uuid::new_v4();
        tracing::info!(
            "Snapshot run {} for {}: {} instruments, {} workers",
            run_id,
            as_of,
            self.universe.len(),
            self.concurrency
        );

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut pending: BTreeSet<String> = self.universe.iter().cloned().collect();
        let mut tasks = JoinSet::new();

        for instrument_id in self.universe.iter().cloned() {
            let semaphore = Arc::clone(&semaphore);
            let orchestrator = Arc::clone(&self.orchestrator);
            let prices = Arc::clone(&self.prices);
            let cancel = Arc::clone(&self.cancel);

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (instrument_id, Err(AnalysisError::Cancelled)),
                };
                if cancel.load(Ordering::SeqCst) {
                    return (instrument_id, Err(AnalysisError::Cancelled));
                }
                let result = build_entry(&orchestrator, prices.as_ref(), &instrument_id, as_of).await;
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
                Ok((_, Err(AnalysisError::Cancelled))) => {}
                Ok((instrument_id, Ok((entry, degraded)))) => {
                    if degraded.is_empty() {
                        summary.record_success();
                    } else {
                        let detail = degraded
                            .iter()
                            .map(|d| format!("{}: {}", d.dimension, d.reason))
                            .collect::<Vec<_>>()
                            .join("; ");
                        summary.record_degraded(&instrument_id, detail);
                    }
                    entries.push(entry);
                }
                Ok((instrument_id, Err(e))) => {
                    match &e {
                        AnalysisError::LookAheadViolation { .. } => {
                            tracing::warn!("Rejected {} from {} snapshot: {}", instrument_id, as_of, e)
                        }
                        _ => tracing::warn!("Excluded {} from {} snapshot: {}", instrument_id, as_of, e),
                    }
                    summary.record_error(&instrument_id, &e);
                }
                Err(e) => tracing::error!("Snapshot task error: {}", e),
            }
        }

        if self.is_cancelled() {
            tracing::warn!("Snapshot run {} for {} cancelled", run_id, as_of);
            return Err(AnalysisError::Cancelled);
        }

        // a panicked task never reports its instrument back
        for instrument_id in pending {
            tracing::warn!("Excluded {} from {} snapshot: worker task failed", instrument_id, as_of);
            summary.record_invalid(&instrument_id, "snapshot task failed");
        }

        summary.sort_issues();
        tracing::info!(
            "Snapshot run {} for {} done: {} ok, {} degraded, {} rejected, {} invalid",
            run_id,
            as_of,
            summary.succeeded,
            summary.degraded,
            summary.rejected,
            summary.invalid
        );
        Ok(Snapshot::new(as_of, entries, summary))
    }
}

async fn build_entry(
    orchestrator: &AnalysisOrchestrator,
    prices: &dyn PriceLookup,
    instrument_id: &str,
    as_of: NaiveDate,
) -> Result<(SnapshotEntry, Vec<DegradedDimension>), AnalysisError> {
    let analysis = orchestrator.analyze(instrument_id, as_of).await?;

    let (entry_price, price_as_of) = match prices.get_price(instrument_id, as_of).await {
        Ok(point) => {
            validate_price(instrument_id, &point, as_of)?;
            (Some(point.price), Some(point.date))
        }
        Err(e) if e.is_degradable() => {
            tracing::warn!("No entry price for {} as of {}: {}", instrument_id, as_of, e);
            (None, None)
        }
        Err(e) => return Err(e),
    };

    Ok((
        SnapshotEntry {
            score: analysis.score,
            entry_price,
            price_as_of,
        },
        analysis.degraded,
    ))
}
