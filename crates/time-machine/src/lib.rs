//! Time Machine
//!
//! Point-in-time snapshots of the composite ranking. Reconstructs what the
//! ranking would have said on past dates, using only data public by then,
//! and keeps every build in an append-only store for historical replay.

pub mod cadence;
pub mod snapshot;
pub mod store;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use analysis_core::{AnalysisError, Snapshot};
use chrono::NaiveDate;
use tokio::sync::Mutex;

pub use cadence::Cadence;
pub use snapshot::{SnapshotBuilder, DEFAULT_CONCURRENCY};
pub use store::{MemorySnapshotStore, SnapshotStore, SqliteSnapshotStore};

/// Snapshot builder plus store, keyed by as-of date.
pub struct TimeMachine {
    builder: SnapshotBuilder,
    store: Arc<dyn SnapshotStore>,
    build_lock: Mutex<()>,
}

impl TimeMachine {
    pub fn new(builder: SnapshotBuilder, store: Arc<dyn SnapshotStore>) -> Self {
        Self {
            builder,
            store,
            build_lock: Mutex::new(()),
        }
    }

    pub fn builder(&self) -> &SnapshotBuilder {
        &self.builder
    }

    pub fn store(&self) -> &Arc<dyn SnapshotStore> {
        &self.store
    }

    /// Stored snapshot for `date`, building it first if there is none.
    /// `force_rebuild` always builds and appends a new revision.
    pub async fn get_or_build(&self, date: NaiveDate, force_rebuild: bool) -> Result<Arc<Snapshot>, AnalysisError> {
        let _guard = self.build_lock.lock().await;

        if !force_rebuild {
            if let Some(existing) = self.store.latest(date).await? {
                tracing::debug!("Using stored snapshot {} revision {}", date, existing.revision);
                return Ok(existing);
            }
        }

        let snapshot = self.builder.build_snapshot(date).await?;
        let stored = self.store.append(snapshot).await?;
        tracing::info!(
            "Stored snapshot {} revision {} with {} entries",
            date,
            stored.revision,
            stored.len()
        );
        Ok(stored)
    }

    /// Snapshots for each date, in order. Stops with `Cancelled` at the first
    /// cancelled date; everything stored before it stays stored, so a rerun
    /// picks up from the first missing date.
    pub async fn build_series(&self, dates: &[NaiveDate], force_rebuild: bool) -> Result<Vec<Arc<Snapshot>>, AnalysisError> {
        let mut snapshots = Vec::with_capacity(dates.len());
        for (i, date) in dates.iter().enumerate() {
            if self.builder.is_cancelled() {
                tracing::warn!("Series stopped before {} ({}/{} done)", date, i, dates.len());
                return Err(AnalysisError::Cancelled);
            }
            snapshots.push(self.get_or_build(*date, force_rebuild).await?);
            tracing::info!("Series progress: {}/{}", i + 1, dates.len());
        }
        Ok(snapshots)
    }
}
