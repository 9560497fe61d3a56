//! Point-in-time historical dataset.
//!
//! Every record carries the date it became public (`filed_on`, `published_on`,
//! `observed_on`). Providers filter on that date, never on the economic period
//! the record describes.

use std::collections::BTreeMap;
use std::path::Path;

use analysis_core::{AnalysisError, CatalystKind, PricePoint};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Form 4 style insider transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsiderTransaction {
    /// Date the filing became public
    pub filed_on: NaiveDate,
    pub traded_on: NaiveDate,
    pub insider: String,
    pub shares: f64,
    pub is_purchase: bool,
}

/// 13F style aggregate institutional ownership.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstitutionalFiling {
    pub filed_on: NaiveDate,
    pub period_end: NaiveDate,
    /// Percentage of float held by institutions (0-100)
    pub ownership_pct: f64,
    pub holder_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundamentalReport {
    pub published_on: NaiveDate,
    pub revenue_growth_pct: f64,
    pub eps_growth_pct: f64,
    pub return_on_equity_pct: f64,
    pub debt_to_equity: f64,
}

/// A dated bullish event published about the instrument (earnings, analyst actions).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalystRecord {
    pub published_on: NaiveDate,
    pub kind: CatalystKind,
    #[serde(default)]
    pub description: String,
}

/// Sector-level trailing return, observed on a date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectorReading {
    pub observed_on: NaiveDate,
    /// Trailing 3-month sector return in percent
    pub return_3m_pct: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstrumentHistory {
    pub sector: String,
    #[serde(default)]
    pub prices: Vec<PricePoint>,
    #[serde(default)]
    pub insider_transactions: Vec<InsiderTransaction>,
    #[serde(default)]
    pub institutional_filings: Vec<InstitutionalFiling>,
    #[serde(default)]
    pub fundamentals: Vec<FundamentalReport>,
    #[serde(default)]
    pub events: Vec<CatalystRecord>,
}

impl InstrumentHistory {
    /// Prices observed on or before `as_of`, ascending.
    pub fn prices_as_of(&self, as_of: NaiveDate) -> &[PricePoint] {
        let end = self.prices.partition_point(|p| p.date <= as_of);
        &self.prices[..end]
    }
}

/// The full dataset the providers and the price lookup read from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoricalDataset {
    pub instruments: BTreeMap<String, InstrumentHistory>,
    #[serde(default)]
    pub sectors: BTreeMap<String, Vec<SectorReading>>,
}

impl HistoricalDataset {
    /// Load a JSON dataset from disk and normalize record order.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, AnalysisError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AnalysisError::StorageError(format!("cannot read dataset {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, AnalysisError> {
        let mut dataset: HistoricalDataset = serde_json::from_str(raw)
            .map_err(|e| AnalysisError::StorageError(format!("malformed dataset: {e}")))?;
        dataset.normalize();
        Ok(dataset)
    }

    /// Sort every series by its public date so range filters can rely on order.
    pub fn normalize(&mut self) {
        for history in self.instruments.values_mut() {
            history.prices.sort_by_key(|p| p.date);
            history.prices.dedup_by_key(|p| p.date);
            history.insider_transactions.sort_by_key(|t| t.filed_on);
            history.institutional_filings.sort_by_key(|f| f.filed_on);
            history.fundamentals.sort_by_key(|r| r.published_on);
            history.events.sort_by_key(|e| e.published_on);
        }
        for readings in self.sectors.values_mut() {
            readings.sort_by_key(|r| r.observed_on);
        }
    }

    pub fn instrument(&self, instrument_id: &str) -> Option<&InstrumentHistory> {
        self.instruments.get(instrument_id)
    }

    pub fn instrument_ids(&self) -> Vec<String> {
        self.instruments.keys().cloned().collect()
    }

    /// Latest reading of `sector` observed on or before `as_of`.
    pub fn sector_reading(&self, sector: &str, as_of: NaiveDate) -> Option<&SectorReading> {
        self.sectors
            .get(sector)?
            .iter()
            .rev()
            .find(|r| r.observed_on <= as_of)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    /// Daily prices from `start`, one per calendar day, following `f(i)`.
    pub fn daily_prices(start: &str, days: usize, f: impl Fn(usize) -> f64) -> Vec<PricePoint> {
        let start = d(start);
        (0..days)
            .map(|i| PricePoint {
                date: start + chrono::Duration::days(i as i64),
                price: f(i),
            })
            .collect()
    }

    pub fn dataset_with(id: &str, history: InstrumentHistory) -> HistoricalDataset {
        let mut dataset = HistoricalDataset::default();
        dataset.instruments.insert(id.to_string(), history);
        dataset.normalize();
        dataset
    }
}
