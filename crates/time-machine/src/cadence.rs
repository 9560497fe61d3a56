use std::fmt;
use std::str::FromStr;

use analysis_core::AnalysisError;
use chrono::{Duration, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// How often a historical snapshot is taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Daily,
    Weekly,
    Monthly,
}

impl Cadence {
    /// Snapshot dates from `start` through `end`, inclusive, stepping by the cadence.
    /// Monthly steps keep the start's day of month, clamped to shorter months.
    pub fn dates(&self, start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
        let mut dates = Vec::new();
        let mut step: u32 = 0;
        loop {
            let next = match self {
                Cadence::Daily => start.checked_add_signed(Duration::days(step as i64)),
                Cadence::Weekly => start.checked_add_signed(Duration::weeks(step as i64)),
                Cadence::Monthly => start.checked_add_months(Months::new(step)),
            };
            match next {
                Some(date) if date <= end => dates.push(date),
                _ => break,
            }
            step += 1;
        }
        dates
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Daily => write!(f, "daily"),
            Cadence::Weekly => write!(f, "weekly"),
            Cadence::Monthly => write!(f, "monthly"),
        }
    }
}

impl FromStr for Cadence {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "daily" => Ok(Cadence::Daily),
            "weekly" => Ok(Cadence::Weekly),
            "monthly" => Ok(Cadence::Monthly),
            _ => Err(AnalysisError::ConfigError(format!("Invalid snapshot cadence: {}", s))),
        }
    }
}
