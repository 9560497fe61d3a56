//! Append-only snapshot storage.
//!
//! A snapshot date can hold several revisions. Revision 1 is the first build;
//! every forced rebuild appends the next one. Nothing is ever overwritten.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use analysis_core::{AnalysisError, Snapshot};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tokio::sync::{Mutex, RwLock};

#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Newest revision stored for `date`.
    async fn latest(&self, date: NaiveDate) -> Result<Option<Arc<Snapshot>>, AnalysisError>;

    /// Every revision for `date`, oldest first.
    async fn revisions(&self, date: NaiveDate) -> Result<Vec<Arc<Snapshot>>, AnalysisError>;

    /// Store `snapshot` as the next revision of its date and return the stored copy.
    async fn append(&self, snapshot: Snapshot) -> Result<Arc<Snapshot>, AnalysisError>;

    /// Dates with at least one revision, ascending.
    async fn dates(&self) -> Result<Vec<NaiveDate>, AnalysisError>;
}

#[derive(Default)]
pub struct MemorySnapshotStore {
    snapshots: RwLock<BTreeMap<NaiveDate, Vec<Arc<Snapshot>>>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn latest(&self, date: NaiveDate) -> Result<Option<Arc<Snapshot>>, AnalysisError> {
        Ok(self
            .snapshots
            .read()
            .await
            .get(&date)
            .and_then(|revs| revs.last().cloned()))
    }

    async fn revisions(&self, date: NaiveDate) -> Result<Vec<Arc<Snapshot>>, AnalysisError> {
        Ok(self.snapshots.read().await.get(&date).cloned().unwrap_or_default())
    }

    async fn append(&self, mut snapshot: Snapshot) -> Result<Arc<Snapshot>, AnalysisError> {
        let mut snapshots = self.snapshots.write().await;
        let revisions = snapshots.entry(snapshot.snapshot_date).or_default();
        snapshot.revision = revisions.len() as u32 + 1;
        let stored = Arc::new(snapshot);
        revisions.push(Arc::clone(&stored));
        Ok(stored)
    }

    async fn dates(&self) -> Result<Vec<NaiveDate>, AnalysisError> {
        Ok(self.snapshots.read().await.keys().copied().collect())
    }
}

fn storage_error(e: impl std::fmt::Display) -> AnalysisError {
    AnalysisError::StorageError(e.to_string())
}

/// SQLite-backed store. Each revision is one row holding the snapshot as JSON.
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
    /// Serializes revision numbering within this process.
    write_lock: Mutex<()>,
}

impl SqliteSnapshotStore {
    pub async fn connect(database_url: &str) -> Result<Self, AnalysisError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(storage_error)?
            .create_if_missing(true);

        // Every connection to an in-memory URL is a separate database.
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options.connect_with(options).await.map_err(storage_error)?;
        let store = Self {
            pool,
            write_lock: Mutex::new(()),
        };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), AnalysisError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS snapshots (
                snapshot_date TEXT NOT NULL,
                revision INTEGER NOT NULL,
                entry_count INTEGER NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (snapshot_date, revision)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn decode(payload: &str) -> Result<Arc<Snapshot>, AnalysisError> {
        serde_json::from_str::<Snapshot>(payload)
            .map(Arc::new)
            .map_err(|e| storage_error(format!("corrupt snapshot payload: {e}")))
    }
}

#[async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn latest(&self, date: NaiveDate) -> Result<Option<Arc<Snapshot>>, AnalysisError> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT payload FROM snapshots WHERE snapshot_date = ? ORDER BY revision DESC LIMIT 1",
        )
        .bind(date)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_error)?;

        row.map(|(payload,)| Self::decode(&payload)).transpose()
    }

    async fn revisions(&self, date: NaiveDate) -> Result<Vec<Arc<Snapshot>>, AnalysisError> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT payload FROM snapshots WHERE snapshot_date = ? ORDER BY revision ASC")
                .bind(date)
                .fetch_all(&self.pool)
                .await
                .map_err(storage_error)?;

        rows.iter().map(|(payload,)| Self::decode(payload)).collect()
    }

    async fn append(&self, mut snapshot: Snapshot) -> Result<Arc<Snapshot>, AnalysisError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let (current,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(revision), 0) FROM snapshots WHERE snapshot_date = ?")
                .bind(snapshot.snapshot_date)
                .fetch_one(&mut *tx)
                .await
                .map_err(storage_error)?;
        snapshot.revision = current as u32 + 1;

        let payload = serde_json::to_string(&snapshot).map_err(storage_error)?;
        sqlx::query(
            "INSERT INTO snapshots (snapshot_date, revision, entry_count, payload) VALUES (?, ?, ?, ?)",
        )
        .bind(snapshot.snapshot_date)
        .bind(snapshot.revision as i64)
        .bind(snapshot.entries.len() as i64)
        .bind(&payload)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        tracing::debug!(
            "Stored snapshot {} revision {} ({} entries)",
            snapshot.snapshot_date,
            snapshot.revision,
            snapshot.entries.len()
        );
        Ok(Arc::new(snapshot))
    }

    async fn dates(&self) -> Result<Vec<NaiveDate>, AnalysisError> {
        let rows: Vec<(NaiveDate,)> =
            sqlx::query_as("SELECT DISTINCT snapshot_date FROM snapshots ORDER BY snapshot_date ASC")
                .fetch_all(&self.pool)
                .await
                .map_err(storage_error)?;
        Ok(rows.into_iter().map(|(d,)| d).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis_core::RunSummary;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn empty(date: &str, succeeded: usize) -> Snapshot {
        let summary = RunSummary { succeeded, ..Default::default() };
        Snapshot::new(d(date), Vec::new(), summary)
    }

    async fn exercise(store: &dyn SnapshotStore) {
        assert!(store.latest(d("2025-06-01")).await.unwrap().is_none());

        let first = store.append(empty("2025-06-01", 1)).await.unwrap();
        let second = store.append(empty("2025-06-01", 2)).await.unwrap();
        store.append(empty("2025-05-01", 3)).await.unwrap();

        assert_eq!(first.revision, 1);
        assert_eq!(second.revision, 2);

        let latest = store.latest(d("2025-06-01")).await.unwrap().unwrap();
        assert_eq!(latest.revision, 2);
        assert_eq!(latest.summary.succeeded, 2);

        // the first build is still there
        let revs = store.revisions(d("2025-06-01")).await.unwrap();
        assert_eq!(revs.iter().map(|s| s.revision).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(revs[0].summary.succeeded, 1);

        assert_eq!(store.dates().await.unwrap(), vec![d("2025-05-01"), d("2025-06-01")]);
    }

    #[tokio::test]
    async fn test_memory_store_revisions() {
        exercise(&MemorySnapshotStore::new()).await;
    }

    #[tokio::test]
    async fn test_sqlite_store_revisions() {
        let store = SqliteSnapshotStore::connect("sqlite::memory:").await.unwrap();
        exercise(&store).await;
    }

    #[tokio::test]
    async fn test_concurrent_readers_during_appends() {
        let store = Arc::new(MemorySnapshotStore::new());
        store.append(empty("2025-06-01", 0)).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    store.append(empty("2025-06-01", i)).await.map(|_| ())
                } else {
                    store.latest(d("2025-06-01")).await.map(|s| assert!(s.is_some()))
                }
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        let revs = store.revisions(d("2025-06-01")).await.unwrap();
        assert_eq!(revs.len(), 5);
        assert!(revs.iter().enumerate().all(|(i, s)| s.revision as usize == i + 1));
    }
}
