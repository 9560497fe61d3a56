use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// A provider cannot answer for the requested date. Degrades one value.
    #[error("{origin} unavailable for {instrument_id} as of {as_of}")]
    DataUnavailable {
        instrument_id: String,
        origin: String,
        as_of: NaiveDate,
    },

    /// Data stamped after the requested as-of date. Fatal for the snapshot entry.
    #[error("look-ahead violation for {instrument_id}: {origin} stamped {data_as_of}, after as-of {as_of}")]
    LookAheadViolation {
        instrument_id: String,
        origin: String,
        data_as_of: NaiveDate,
        as_of: NaiveDate,
    },

    /// Exit date lies beyond the available price history.
    #[error("incomplete trade for {instrument_id}: exit due {exit_date}, history ends {history_end:?}")]
    IncompleteTrade {
        instrument_id: String,
        exit_date: NaiveDate,
        history_end: Option<NaiveDate>,
    },

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("{origin} timed out after {timeout_ms}ms")]
    Timeout { origin: String, timeout_ms: u64 },

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Run cancelled")]
    Cancelled,
}

impl AnalysisError {
    pub fn unavailable(
        instrument_id: impl Into<String>,
        origin: impl Into<String>,
        as_of: NaiveDate,
    ) -> Self {
        AnalysisError::DataUnavailable {
            instrument_id: instrument_id.into(),
            origin: origin.into(),
            as_of,
        }
    }

    /// Errors worth another attempt under the shared retry policy.
    /// Unavailability is a definitive historical answer and is never retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AnalysisError::Timeout { .. } | AnalysisError::ProviderError(_)
        )
    }

    /// Errors that degrade a single dimension instead of rejecting the entry.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            AnalysisError::DataUnavailable { .. }
                | AnalysisError::Timeout { .. }
                | AnalysisError::ProviderError(_)
        )
    }
}
