use std::sync::atomic::{AtomicU64, Ordering};

use analysis_core::{AnalysisError, DimensionScore};
use chrono::NaiveDate;
use dashmap::DashMap;
use serde::Serialize;

/// Cache key: which provider answered for which instrument as of which date.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub instrument_id: String,
    pub source: String,
    pub as_of: NaiveDate,
}

impl CacheKey {
    pub fn new(instrument_id: &str, source: &str, as_of: NaiveDate) -> Self {
        Self {
            instrument_id: instrument_id.to_string(),
            source: source.to_string(),
            as_of,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Provider answers keyed by (instrument, source, as-of).
///
/// Historical answers never change for a fixed as-of date, so entries have no
/// TTL. Definitive answers (a score, or "unavailable") are kept; transient
/// failures are not, so the next build asks the provider again.
#[derive(Default)]
pub struct ProviderCache {
    entries: DashMap<CacheKey, Result<DimensionScore, AnalysisError>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ProviderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey) -> Option<Result<DimensionScore, AnalysisError>> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("cache hit {}:{}:{}", key.source, key.instrument_id, key.as_of);
                Some(entry.value().clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a provider answer. Returns whether it was cacheable.
    pub fn insert(&self, key: CacheKey, result: &Result<DimensionScore, AnalysisError>) -> bool {
        let cacheable = match result {
            Ok(_) => true,
            Err(AnalysisError::DataUnavailable { .. }) => true,
            Err(_) => false,
        };
        if cacheable {
            self.entries.insert(key, result.clone());
        }
        cacheable
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}
