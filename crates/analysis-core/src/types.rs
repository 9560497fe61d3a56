use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{AnalysisError, RunSummary};

/// Tolerance used when re-checking score arithmetic.
const SCORE_EPSILON: f64 = 1e-9;

/// Analytical axis a provider scores an instrument on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Pattern,
    Insider,
    Sector,
    Institutional,
    Fundamental,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Pattern,
        Dimension::Insider,
        Dimension::Sector,
        Dimension::Institutional,
        Dimension::Fundamental,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Pattern => "pattern",
            Dimension::Insider => "insider",
            Dimension::Sector => "sector",
            Dimension::Institutional => "institutional",
            Dimension::Fundamental => "fundamental",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dimension {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pattern" => Ok(Dimension::Pattern),
            "insider" => Ok(Dimension::Insider),
            "sector" => Ok(Dimension::Sector),
            "institutional" => Ok(Dimension::Institutional),
            "fundamental" => Ok(Dimension::Fundamental),
            other => Err(AnalysisError::ConfigError(format!("unknown dimension: {other}"))),
        }
    }
}

/// Momentum classification of a sector relative to its own recent history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectorMomentum {
    Improving,
    Stable,
    Declining,
}

/// Recency-sensitive bullish events that feed timing convergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalystKind {
    InsiderBuy,
    InstitutionalAccumulation,
    EarningsSurprise,
    AnalystUpgrade,
}

/// Price-structure stage reported by the pattern provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseStage {
    EarlyBase,
    LateBase,
    Breakout,
    Extended,
    Downtrend,
}

impl BaseStage {
    pub fn is_early(&self) -> bool {
        matches!(self, BaseStage::EarlyBase)
    }
}

/// A dated fact observed by a provider while computing its score.
///
/// Evidence is what the bonus rules read; its date is checked against the
/// as-of date exactly like the score's own `data_as_of`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Evidence {
    SectorStanding {
        sector: String,
        /// 1 = strongest sector
        rank: u32,
        sector_count: u32,
        momentum: SectorMomentum,
        observed_on: NaiveDate,
    },
    Catalyst {
        kind: CatalystKind,
        occurred_on: NaiveDate,
        description: String,
    },
    BaseStage {
        stage: BaseStage,
        observed_on: NaiveDate,
    },
}

impl Evidence {
    pub fn observed_on(&self) -> NaiveDate {
        match self {
            Evidence::SectorStanding { observed_on, .. } => *observed_on,
            Evidence::Catalyst { occurred_on, .. } => *occurred_on,
            Evidence::BaseStage { observed_on, .. } => *observed_on,
        }
    }
}

/// One provider's 0-100 score for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub instrument_id: String,
    pub dimension: Dimension,
    pub value: f64,
    /// Timestamp of the newest input the value was derived from
    pub data_as_of: NaiveDate,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
}

impl DimensionScore {
    pub fn new(
        instrument_id: impl Into<String>,
        dimension: Dimension,
        value: f64,
        data_as_of: NaiveDate,
    ) -> Result<Self, AnalysisError> {
        let instrument_id = instrument_id.into();
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(AnalysisError::ComputationError(format!(
                "{dimension} score for {instrument_id} out of range: {value}"
            )));
        }
        Ok(Self {
            instrument_id,
            dimension,
            value,
            data_as_of,
            evidence: Vec::new(),
        })
    }

    pub fn with_evidence(mut self, evidence: Evidence) -> Self {
        self.evidence.push(evidence);
        self
    }

    /// Newest date anywhere in this score, evidence included.
    pub fn latest_stamp(&self) -> NaiveDate {
        self.evidence
            .iter()
            .map(Evidence::observed_on)
            .fold(self.data_as_of, |acc, d| acc.max(d))
    }
}

/// Discrete quality bucket derived from the final composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Legendary,
    Epic,
    Excellent,
    Good,
    Moderate,
}

impl Tier {
    pub const ALL: [Tier; 5] = [
        Tier::Legendary,
        Tier::Epic,
        Tier::Excellent,
        Tier::Good,
        Tier::Moderate,
    ];

    /// Inclusive lower bound of the band; `None` for the open bottom band.
    pub fn lower_bound(&self) -> Option<f64> {
        match self {
            Tier::Legendary => Some(85.0),
            Tier::Epic => Some(75.0),
            Tier::Excellent => Some(65.0),
            Tier::Good => Some(55.0),
            Tier::Moderate => None,
        }
    }

    /// Bands are checked top-down, so a boundary value lands in the higher band.
    pub fn from_score(score: f64) -> Self {
        for tier in Tier::ALL {
            if let Some(bound) = tier.lower_bound() {
                if score >= bound {
                    return tier;
                }
            }
        }
        Tier::Moderate
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Legendary => "legendary",
            Tier::Epic => "epic",
            Tier::Excellent => "excellent",
            Tier::Good => "good",
            Tier::Moderate => "moderate",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value a dimension contributed to a composite score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionValue {
    pub value: f64,
    /// True when the provider could not answer and the neutral default was used
    pub degraded: bool,
    pub data_as_of: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BonusKind {
    SectorBoost,
    TimingConvergence,
}

/// An applied bonus and the human-readable reason it fired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BonusReason {
    pub kind: BonusKind,
    pub points: f64,
    pub reason: String,
}

/// Final ranked score of one instrument at one as-of date.
///
/// Only [`CompositeScore::new`] builds one, so `final_score == base_score + bonus`
/// and `tier == Tier::from_score(final_score)` always hold. Deserialization goes
/// through the same checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CompositeScoreRecord")]
pub struct CompositeScore {
    instrument_id: String,
    as_of_date: NaiveDate,
    dimension_values: BTreeMap<Dimension, DimensionValue>,
    base_score: f64,
    bonus: f64,
    final_score: f64,
    tier: Tier,
    bonus_reasons: Vec<BonusReason>,
}

impl CompositeScore {
    pub fn new(
        instrument_id: impl Into<String>,
        as_of_date: NaiveDate,
        dimension_values: BTreeMap<Dimension, DimensionValue>,
        base_score: f64,
        bonus_reasons: Vec<BonusReason>,
    ) -> Result<Self, AnalysisError> {
        let instrument_id = instrument_id.into();
        if !base_score.is_finite() {
            return Err(AnalysisError::ComputationError(format!(
                "non-finite base score for {instrument_id}"
            )));
        }
        if let Some(bad) = bonus_reasons
            .iter()
            .find(|b| !b.points.is_finite() || b.points < 0.0)
        {
            return Err(AnalysisError::ComputationError(format!(
                "invalid {:?} bonus for {instrument_id}: {}",
                bad.kind, bad.points
            )));
        }

        let bonus: f64 = bonus_reasons.iter().map(|b| b.points).sum();
        let final_score = base_score + bonus;

        Ok(Self {
            instrument_id,
            as_of_date,
            dimension_values,
            base_score,
            bonus,
            final_score,
            tier: Tier::from_score(final_score),
            bonus_reasons,
        })
    }

    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }

    pub fn as_of_date(&self) -> NaiveDate {
        self.as_of_date
    }

    pub fn dimension_values(&self) -> &BTreeMap<Dimension, DimensionValue> {
        &self.dimension_values
    }

    pub fn base_score(&self) -> f64 {
        self.base_score
    }

    pub fn bonus(&self) -> f64 {
        self.bonus
    }

    pub fn final_score(&self) -> f64 {
        self.final_score
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn bonus_reasons(&self) -> &[BonusReason] {
        &self.bonus_reasons
    }

    pub fn bonus_points(&self, kind: BonusKind) -> f64 {
        self.bonus_reasons
            .iter()
            .filter(|b| b.kind == kind)
            .map(|b| b.points)
            .sum()
    }

    pub fn has_bonus(&self, kind: BonusKind) -> bool {
        self.bonus_points(kind) > 0.0
    }

    pub fn bonus_flags(&self) -> Vec<BonusKind> {
        let mut flags: Vec<BonusKind> = self
            .bonus_reasons
            .iter()
            .filter(|b| b.points > 0.0)
            .map(|b| b.kind)
            .collect();
        flags.sort();
        flags.dedup();
        flags
    }

    pub fn degraded_dimensions(&self) -> Vec<Dimension> {
        self.dimension_values
            .iter()
            .filter(|(_, v)| v.degraded)
            .map(|(d, _)| *d)
            .collect()
    }

    pub fn is_degraded(&self) -> bool {
        self.dimension_values.values().any(|v| v.degraded)
    }
}

/// Wire shape of [`CompositeScore`]; converted back through the invariant checks.
#[derive(Debug, Deserialize)]
struct CompositeScoreRecord {
    instrument_id: String,
    as_of_date: NaiveDate,
    dimension_values: BTreeMap<Dimension, DimensionValue>,
    base_score: f64,
    bonus: f64,
    final_score: f64,
    tier: Tier,
    bonus_reasons: Vec<BonusReason>,
}

impl TryFrom<CompositeScoreRecord> for CompositeScore {
    type Error = AnalysisError;

    fn try_from(record: CompositeScoreRecord) -> Result<Self, Self::Error> {
        let rebuilt = CompositeScore::new(
            record.instrument_id,
            record.as_of_date,
            record.dimension_values,
            record.base_score,
            record.bonus_reasons,
        )?;

        if (rebuilt.bonus - record.bonus).abs() > SCORE_EPSILON
            || (rebuilt.final_score - record.final_score).abs() > SCORE_EPSILON
            || rebuilt.tier != record.tier
        {
            return Err(AnalysisError::ComputationError(format!(
                "stored composite score for {} is inconsistent (final {} / tier {})",
                rebuilt.instrument_id, record.final_score, record.tier
            )));
        }
        Ok(rebuilt)
    }
}

/// A single dated price observation (daily close).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub price: f64,
}

/// A scored instrument inside a snapshot, with the price a trade would enter at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub score: CompositeScore,
    pub entry_price: Option<f64>,
    pub price_as_of: Option<NaiveDate>,
}

impl SnapshotEntry {
    pub fn instrument_id(&self) -> &str {
        self.score.instrument_id()
    }
}

/// Dated, immutable, fully-scored view of the tracked universe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub snapshot_date: NaiveDate,
    /// 1 for the first build of a date; incremented by each forced rebuild
    pub revision: u32,
    pub entries: Vec<SnapshotEntry>,
    pub summary: RunSummary,
}

impl Snapshot {
    /// Entries are ranked by final score (descending), ties broken by instrument id.
    pub fn new(snapshot_date: NaiveDate, mut entries: Vec<SnapshotEntry>, summary: RunSummary) -> Self {
        entries.sort_by(|a, b| {
            b.score
                .final_score()
                .partial_cmp(&a.score.final_score())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.instrument_id().cmp(b.instrument_id()))
        });
        Self {
            snapshot_date,
            revision: 1,
            entries,
            summary,
        }
    }

    pub fn entry(&self, instrument_id: &str) -> Option<&SnapshotEntry> {
        self.entries.iter().find(|e| e.instrument_id() == instrument_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Same scored content, ignoring the revision counter.
    pub fn same_content(&self, other: &Snapshot) -> bool {
        self.snapshot_date == other.snapshot_date
            && self.entries == other.entries
            && self.summary == other.summary
    }
}
