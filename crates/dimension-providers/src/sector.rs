use std::sync::Arc;

use analysis_core::{AnalysisError, Dimension, DimensionProvider, DimensionScore, Evidence, SectorMomentum};
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};

use crate::HistoricalDataset;

/// Momentum is the change in trailing return versus this many days earlier.
const MOMENTUM_LOOKBACK_DAYS: i64 = 30;
/// Change (in return percentage points) needed to call momentum improving/declining.
const MOMENTUM_THRESHOLD: f64 = 2.0;

/// Sector momentum: ranks the instrument's sector against every sector by
/// trailing 3-month return, as known on the as-of date.
pub struct SectorProvider {
    dataset: Arc<HistoricalDataset>,
}

/// Where a sector stood on a date.
#[derive(Debug, Clone, PartialEq)]
pub struct SectorStanding {
    pub rank: u32,
    pub sector_count: u32,
    pub momentum: SectorMomentum,
    pub observed_on: NaiveDate,
}

impl SectorProvider {
    pub fn new(dataset: Arc<HistoricalDataset>) -> Self {
        Self { dataset }
    }

    pub fn standing(&self, sector: &str, as_of: NaiveDate) -> Option<SectorStanding> {
        let own = self.dataset.sector_reading(sector, as_of)?;

        let mut returns: Vec<(String, f64)> = self
            .dataset
            .sectors
            .keys()
            .filter_map(|name| {
                self.dataset
                    .sector_reading(name, as_of)
                    .map(|r| (name.clone(), r.return_3m_pct))
            })
            .collect();
        returns.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        let rank = returns.iter().position(|(name, _)| name == sector)? as u32 + 1;

        let momentum = match self
            .dataset
            .sector_reading(sector, own.observed_on - Duration::days(MOMENTUM_LOOKBACK_DAYS))
        {
            Some(prev) if own.return_3m_pct - prev.return_3m_pct > MOMENTUM_THRESHOLD => {
                SectorMomentum::Improving
            }
            Some(prev) if prev.return_3m_pct - own.return_3m_pct > MOMENTUM_THRESHOLD => {
                SectorMomentum::Declining
            }
            _ => SectorMomentum::Stable,
        };

        Some(SectorStanding {
            rank,
            sector_count: returns.len() as u32,
            momentum,
            observed_on: own.observed_on,
        })
    }
}

/// 100 for the top sector, 0 for the bottom, linear in between.
pub fn rank_score(rank: u32, sector_count: u32) -> f64 {
    if sector_count <= 1 {
        return 50.0;
    }
    100.0 * (1.0 - (rank - 1) as f64 / (sector_count - 1) as f64)
}

#[async_trait]
impl DimensionProvider for SectorProvider {
    fn name(&self) -> &str {
        "sector-momentum"
    }

    fn dimension(&self) -> Dimension {
        Dimension::Sector
    }

    async fn get_score(&self, instrument_id: &str, as_of: NaiveDate) -> Result<DimensionScore, AnalysisError> {
        let sector = self
            .dataset
            .instrument(instrument_id)
            .map(|h| h.sector.clone())
            .ok_or_else(|| AnalysisError::unavailable(instrument_id, self.name(), as_of))?;

        let standing = self
            .standing(&sector, as_of)
            .ok_or_else(|| AnalysisError::unavailable(instrument_id, self.name(), as_of))?;

        let value = rank_score(standing.rank, standing.sector_count);
        Ok(
            DimensionScore::new(instrument_id, Dimension::Sector, value, standing.observed_on)?
                .with_evidence(Evidence::SectorStanding {
                    sector,
                    rank: standing.rank,
                    sector_count: standing.sector_count,
                    momentum: standing.momentum,
                    observed_on: standing.observed_on,
                }),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::*;
    use crate::{InstrumentHistory, SectorReading};

    fn reading(on: &str, ret: f64) -> SectorReading {
        SectorReading { observed_on: d(on), return_3m_pct: ret }
    }

    fn provider() -> SectorProvider {
        let mut dataset = dataset_with(
            "AAPL",
            InstrumentHistory { sector: "tech".into(), ..Default::default() },
        );
        dataset
            .sectors
            .insert("tech".into(), vec![reading("2025-04-01", 2.0), reading("2025-05-01", 9.0)]);
        dataset
            .sectors
            .insert("energy".into(), vec![reading("2025-04-01", 6.0), reading("2025-05-01", 5.0)]);
        dataset
            .sectors
            .insert("utilities".into(), vec![reading("2025-04-01", 1.0), reading("2025-06-10", 20.0)]);
        dataset.normalize();
        SectorProvider::new(Arc::new(dataset))
    }

    #[test]
    fn test_rank_score_endpoints() {
        assert_eq!(rank_score(1, 5), 100.0);
        assert_eq!(rank_score(5, 5), 0.0);
        assert_eq!(rank_score(1, 1), 50.0);
    }

    #[tokio::test]
    async fn test_rank_uses_only_visible_readings() {
        let score = provider().get_score("AAPL", d("2025-06-01")).await.unwrap();
        // utilities' 20% reading is not public until 2025-06-10
        assert_eq!(score.value, 100.0);
        assert_eq!(score.data_as_of, d("2025-05-01"));
        match &score.evidence[0] {
            Evidence::SectorStanding { rank, sector_count, momentum, .. } => {
                assert_eq!((*rank, *sector_count), (1, 3));
                assert_eq!(*momentum, SectorMomentum::Improving);
            }
            other => panic!("unexpected evidence {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_later_date_sees_new_leader() {
        let score = provider().get_score("AAPL", d("2025-06-15")).await.unwrap();
        assert_eq!(score.value, 50.0);
    }
}
