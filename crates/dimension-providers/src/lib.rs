//! Dimension Providers
//!
//! The closed set of score providers registered at startup. Every provider
//! reads a [`HistoricalDataset`] whose records are stamped with the date they
//! became public, and only ever looks at records stamped on or before the
//! requested as-of date.

pub mod dataset;
pub mod fundamental;
pub mod insider;
pub mod institutional;
pub mod pattern;
pub mod prices;
pub mod sector;

use std::sync::Arc;

use analysis_core::DimensionProvider;

pub use dataset::{
    CatalystRecord, FundamentalReport, HistoricalDataset, InsiderTransaction, InstitutionalFiling,
    InstrumentHistory, SectorReading,
};
pub use fundamental::FundamentalProvider;
pub use insider::InsiderProvider;
pub use institutional::InstitutionalProvider;
pub use pattern::PatternProvider;
pub use prices::DatasetPriceLookup;
pub use sector::SectorProvider;

/// One provider per dimension, all backed by the same dataset.
pub fn standard_providers(dataset: Arc<HistoricalDataset>) -> Vec<Arc<dyn DimensionProvider>> {
    vec![
        Arc::new(PatternProvider::new(Arc::clone(&dataset))),
        Arc::new(InsiderProvider::new(Arc::clone(&dataset))),
        Arc::new(SectorProvider::new(Arc::clone(&dataset))),
        Arc::new(InstitutionalProvider::new(Arc::clone(&dataset))),
        Arc::new(FundamentalProvider::new(dataset)),
    ]
}
