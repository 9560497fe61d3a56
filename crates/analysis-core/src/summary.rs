use serde::{Deserialize, Serialize};

use crate::AnalysisError;

/// How a single instrument fared in a batch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Degraded,
    Rejected,
    Incomplete,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentIssue {
    pub instrument_id: String,
    pub kind: IssueKind,
    pub detail: String,
}

/// Per-run outcome counts. Batch operations record into this instead of
/// aborting on the first failing instrument.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub degraded: usize,
    pub rejected: usize,
    pub incomplete: usize,
    pub invalid: usize,
    pub issues: Vec<InstrumentIssue>,
}

impl RunSummary {
    pub fn record_success(&mut self) {
        self.succeeded += 1;
    }

    /// Included in the output, but with one or more neutral-default dimensions.
    pub fn record_degraded(&mut self, instrument_id: &str, detail: impl Into<String>) {
        self.degraded += 1;
        self.push(instrument_id, IssueKind::Degraded, detail.into());
    }

    pub fn record_rejected(&mut self, instrument_id: &str, error: &AnalysisError) {
        self.rejected += 1;
        self.push(instrument_id, IssueKind::Rejected, error.to_string());
    }

    pub fn record_incomplete(&mut self, instrument_id: &str, detail: impl Into<String>) {
        self.incomplete += 1;
        self.push(instrument_id, IssueKind::Incomplete, detail.into());
    }

    pub fn record_invalid(&mut self, instrument_id: &str, detail: impl Into<String>) {
        self.invalid += 1;
        self.push(instrument_id, IssueKind::Invalid, detail.into());
    }

    /// Route an instrument-level error to the matching counter.
    pub fn record_error(&mut self, instrument_id: &str, error: &AnalysisError) {
        match error {
            AnalysisError::LookAheadViolation { .. } => self.record_rejected(instrument_id, error),
            AnalysisError::IncompleteTrade { .. } => {
                self.record_incomplete(instrument_id, error.to_string())
            }
            _ => self.record_invalid(instrument_id, error.to_string()),
        }
    }

    pub fn merge(&mut self, other: RunSummary) {
        self.succeeded += other.succeeded;
        self.degraded += other.degraded;
        self.rejected += other.rejected;
        self.incomplete += other.incomplete;
        self.invalid += other.invalid;
        self.issues.extend(other.issues);
        self.sort_issues();
    }

    /// Deterministic issue order so identical runs compare equal.
    pub fn sort_issues(&mut self) {
        self.issues.sort_by(|a, b| {
            a.instrument_id
                .cmp(&b.instrument_id)
                .then(a.kind.cmp(&b.kind))
                .then_with(|| a.detail.cmp(&b.detail))
        });
    }

    pub fn issues_for(&self, instrument_id: &str) -> Vec<&InstrumentIssue> {
        self.issues
            .iter()
            .filter(|i| i.instrument_id == instrument_id)
            .collect()
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.degraded + self.rejected + self.incomplete + self.invalid
    }

    fn push(&mut self, instrument_id: &str, kind: IssueKind, detail: String) {
        self.issues.push(InstrumentIssue {
            instrument_id: instrument_id.to_string(),
            kind,
            detail,
        });
    }
}
