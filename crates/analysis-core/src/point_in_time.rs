//! Post-hoc point-in-time checks.
//!
//! Providers are asked for data as of a date; these functions verify the answer
//! instead of trusting it. A violation is reported, never clamped.

use chrono::NaiveDate;

use crate::{AnalysisError, DimensionScore, PricePoint};

/// Reject a score whose value or any evidence is stamped after `as_of`.
pub fn validate_dimension_score(score: &DimensionScore, as_of: NaiveDate) -> Result<(), AnalysisError> {
    let stamp = score.latest_stamp();
    if stamp > as_of {
        return Err(AnalysisError::LookAheadViolation {
            instrument_id: score.instrument_id.clone(),
            origin: score.dimension.to_string(),
            data_as_of: stamp,
            as_of,
        });
    }
    Ok(())
}

pub fn validate_price(instrument_id: &str, price: &PricePoint, as_of: NaiveDate) -> Result<(), AnalysisError> {
    if price.date > as_of {
        return Err(AnalysisError::LookAheadViolation {
            instrument_id: instrument_id.to_string(),
            origin: "price".to_string(),
            data_as_of: price.date,
            as_of,
        });
    }
    Ok(())
}
