//! Explainable additive bonuses.
//!
//! Both rules read dimension evidence only. Neither looks at dimension values,
//! so no signal already priced into the base score is counted a second time.

use std::collections::BTreeSet;

use analysis_core::{
    BaseStage, BonusKind, BonusReason, CatalystKind, Dimension, DimensionScore, Evidence, SectorMomentum,
};
use chrono::NaiveDate;

pub const CONVERGENCE_TIGHT_WINDOW_DAYS: i64 = 90;
pub const CONVERGENCE_WIDE_WINDOW_DAYS: i64 = 180;
pub const CONVERGENCE_TIGHT_POINTS: f64 = 10.0;
pub const CONVERGENCE_WIDE_POINTS: f64 = 5.0;
/// Distinct catalyst kinds needed inside a window.
pub const CONVERGENCE_MIN_KINDS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankBucket {
    Leading,
    Strong,
    Middle,
    Lagging,
}

impl RankBucket {
    /// Bucket by rank as a fraction of the sector universe (1 = best).
    pub fn from_rank(rank: u32, sector_count: u32) -> Self {
        if sector_count == 0 || rank == 0 {
            return RankBucket::Lagging;
        }
        let fraction = rank as f64 / sector_count as f64;
        if fraction <= 0.2 {
            RankBucket::Leading
        } else if fraction <= 0.4 {
            RankBucket::Strong
        } else if fraction <= 0.6 {
            RankBucket::Middle
        } else {
            RankBucket::Lagging
        }
    }
}

pub fn sector_boost_points(bucket: RankBucket, momentum: SectorMomentum) -> f64 {
    use SectorMomentum::*;
    match (bucket, momentum) {
        (RankBucket::Leading, Improving) => 10.0,
        (RankBucket::Leading, Stable) => 6.0,
        (RankBucket::Leading, Declining) => 3.0,
        (RankBucket::Strong, Improving) => 6.0,
        (RankBucket::Strong, Stable) => 4.0,
        (RankBucket::Strong, Declining) => 1.0,
        (RankBucket::Middle, Improving) => 3.0,
        (RankBucket::Middle, Stable) => 1.0,
        (RankBucket::Middle, Declining) => 0.0,
        (RankBucket::Lagging, _) => 0.0,
    }
}

fn sector_boost(scores: &[DimensionScore]) -> Option<BonusReason> {
    let (sector, rank, count, momentum) = scores
        .iter()
        .filter(|s| s.dimension == Dimension::Sector)
        .flat_map(|s| s.evidence.iter())
        .find_map(|e| match e {
            Evidence::SectorStanding { sector, rank, sector_count, momentum, .. } => {
                Some((sector, *rank, *sector_count, *momentum))
            }
            _ => None,
        })?;

    let bucket = RankBucket::from_rank(rank, count);
    let points = sector_boost_points(bucket, momentum);
    (points > 0.0).then(|| BonusReason {
        kind: BonusKind::SectorBoost,
        points,
        reason: format!("{sector} ranked {rank}/{count} ({bucket:?}), momentum {momentum:?}"),
    })
}

fn early_base(scores: &[DimensionScore]) -> bool {
    scores
        .iter()
        .filter(|s| s.dimension == Dimension::Pattern)
        .flat_map(|s| s.evidence.iter())
        .any(|e| matches!(e, Evidence::BaseStage { stage, .. } if stage.is_early()))
}

/// Distinct catalyst kinds dated within `window_days` ending at `as_of`.
fn catalyst_kinds(scores: &[DimensionScore], as_of: NaiveDate, window_days: i64) -> BTreeSet<CatalystKind> {
    scores
        .iter()
        .flat_map(|s| s.evidence.iter())
        .filter_map(|e| match e {
            Evidence::Catalyst { kind, occurred_on, .. } => {
                let age = (as_of - *occurred_on).num_days();
                (0..=window_days).contains(&age).then_some(*kind)
            }
            _ => None,
        })
        .collect()
}

fn timing_convergence(as_of: NaiveDate, scores: &[DimensionScore]) -> Option<BonusReason> {
    if !early_base(scores) {
        return None;
    }
    let windows = [
        (CONVERGENCE_TIGHT_WINDOW_DAYS, CONVERGENCE_TIGHT_POINTS),
        (CONVERGENCE_WIDE_WINDOW_DAYS, CONVERGENCE_WIDE_POINTS),
    ];
    windows.into_iter().find_map(|(days, points)| {
        let kinds = catalyst_kinds(scores, as_of, days);
        (kinds.len() >= CONVERGENCE_MIN_KINDS).then(|| BonusReason {
            kind: BonusKind::TimingConvergence,
            points,
            reason: format!(
                "{:?} within {days}d during {:?}",
                kinds,
                BaseStage::EarlyBase
            ),
        })
    })
}

/// Every bonus that fires for this set of dimension scores.
pub fn evaluate(as_of: NaiveDate, scores: &[DimensionScore]) -> Vec<BonusReason> {
    sector_boost(scores)
        .into_iter()
        .chain(timing_convergence(as_of, scores))
        .collect()
}
