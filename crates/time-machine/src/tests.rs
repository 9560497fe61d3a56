use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use analysis_core::{
    AnalysisError, CatalystKind, Dimension, DimensionProvider, DimensionScore, IssueKind, PriceLookup, PricePoint,
};
use analysis_orchestrator::{AnalysisOrchestrator, CompositeScorer, ProviderCache, ProviderRegistry, ResiliencePolicy};
use async_trait::async_trait;
use chrono::NaiveDate;
use dimension_providers::{
    standard_providers, CatalystRecord, DatasetPriceLookup, FundamentalReport, HistoricalDataset, InsiderTransaction,
    InstitutionalFiling, InstrumentHistory, SectorReading,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{MemorySnapshotStore, SnapshotBuilder, SnapshotStore, TimeMachine};

fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Answers with `value`, stamped one day before as-of unless an override
/// stamp is set for the instrument.
struct ScriptedProvider {
    dimension: Dimension,
    value: f64,
    stamps: HashMap<String, NaiveDate>,
    delay: Option<Duration>,
    calls: AtomicU32,
}

impl ScriptedProvider {
    fn new(dimension: Dimension, value: f64) -> Self {
        Self {
            dimension,
            value,
            stamps: HashMap::new(),
            delay: None,
            calls: AtomicU32::new(0),
        }
    }

    fn stamp(mut self, instrument_id: &str, data_as_of: NaiveDate) -> Self {
        self.stamps.insert(instrument_id.to_string(), data_as_of);
        self
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DimensionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        self.dimension.as_str()
    }

    fn dimension(&self) -> Dimension {
        self.dimension
    }

    async fn get_score(&self, instrument_id: &str, as_of: NaiveDate) -> Result<DimensionScore, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let stamp = self
            .stamps
            .get(instrument_id)
            .copied()
            .unwrap_or(as_of - chrono::Duration::days(1));
        DimensionScore::new(instrument_id, self.dimension, self.value, stamp)
    }
}

/// Constant price per instrument, observed on the requested date, optionally
/// with one instrument reporting a later observation date.
struct FlatPrices {
    prices: HashMap<String, f64>,
    future_stamped: Option<String>,
}

#[async_trait]
impl PriceLookup for FlatPrices {
    async fn get_price(&self, instrument_id: &str, date: NaiveDate) -> Result<PricePoint, AnalysisError> {
        let price = self
            .prices
            .get(instrument_id)
            .copied()
            .ok_or_else(|| AnalysisError::unavailable(instrument_id, "price", date))?;
        let date = if self.future_stamped.as_deref() == Some(instrument_id) {
            date + chrono::Duration::days(3)
        } else {
            date
        };
        Ok(PricePoint { date, price })
    }

    async fn get_price_series(
        &self,
        _instrument_id: &str,
        _start: NaiveDate,
        _end: NaiveDate,
    ) -> Result<Vec<PricePoint>, AnalysisError> {
        Ok(Vec::new())
    }

    async fn history_end(&self, _instrument_id: &str) -> Result<Option<NaiveDate>, AnalysisError> {
        Ok(None)
    }
}

fn flat_prices(ids: &[&str]) -> Arc<FlatPrices> {
    Arc::new(FlatPrices {
        prices: ids.iter().map(|id| (id.to_string(), 100.0)).collect(),
        future_stamped: None,
    })
}

fn fast_policy() -> ResiliencePolicy {
    ResiliencePolicy {
        max_attempts: 2,
        base_backoff: Duration::from_millis(1),
        timeout: Duration::from_millis(50),
    }
}

fn orchestrator(providers: Vec<Arc<dyn DimensionProvider>>) -> Arc<AnalysisOrchestrator> {
    Arc::new(AnalysisOrchestrator::new(
        ProviderRegistry::with_providers(providers).unwrap(),
        Arc::new(ProviderCache::new()),
        fast_policy(),
        CompositeScorer::default(),
    ))
}

fn universe(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn test_future_stamped_dimension_is_rejected() {
    let ids = ["AAPL", "LEAK", "MSFT"];
    let pattern = ScriptedProvider::new(Dimension::Pattern, 80.0).stamp("LEAK", d("2025-06-15"));
    let builder = SnapshotBuilder::new(
        orchestrator(vec![
            Arc::new(pattern),
            Arc::new(ScriptedProvider::new(Dimension::Insider, 60.0)),
        ]),
        flat_prices(&ids),
        universe(&ids),
    );

    let snapshot = builder.build_snapshot(d("2025-06-01")).await.unwrap();

    assert!(snapshot.entry("LEAK").is_none());
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.summary.rejected, 1);
    let issues = snapshot.summary.issues_for("LEAK");
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].kind, IssueKind::Rejected);
}

#[tokio::test]
async fn test_future_stamped_price_is_rejected() {
    let ids = ["AAPL", "MSFT"];
    let prices = Arc::new(FlatPrices {
        prices: ids.iter().map(|id| (id.to_string(), 100.0)).collect(),
        future_stamped: Some("MSFT".into()),
    });
    let builder = SnapshotBuilder::new(
        orchestrator(vec![Arc::new(ScriptedProvider::new(Dimension::Pattern, 80.0))]),
        prices,
        universe(&ids),
    );

    let snapshot = builder.build_snapshot(d("2025-06-01")).await.unwrap();
    assert_eq!(snapshot.summary.rejected, 1);
    assert!(snapshot.entry("MSFT").is_none());
}

#[tokio::test]
async fn test_missing_price_keeps_entry_without_entry_price() {
    let builder = SnapshotBuilder::new(
        orchestrator(vec![Arc::new(ScriptedProvider::new(Dimension::Pattern, 80.0))]),
        flat_prices(&["AAPL"]),
        universe(&["AAPL", "NOPX"]),
    );
    let snapshot = builder.build_snapshot(d("2025-06-01")).await.unwrap();
    let entry = snapshot.entry("NOPX").unwrap();
    assert_eq!(entry.entry_price, None);
    assert_eq!(entry.price_as_of, None);
    assert_eq!(snapshot.entry("AAPL").unwrap().entry_price, Some(100.0));
}

/// Price source that panics for one instrument.
struct PanickingPrices {
    inner: Arc<FlatPrices>,
    broken: &'static str,
}

#[async_trait]
impl PriceLookup for PanickingPrices {
    async fn get_price(&self, instrument_id: &str, date: NaiveDate) -> Result<PricePoint, AnalysisError> {
        if instrument_id == self.broken {
            panic!("price feed crashed for {instrument_id}");
        }
        self.inner.get_price(instrument_id, date).await
    }

    async fn get_price_series(
        &self,
        instrument_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PricePoint>, AnalysisError> {
        self.inner.get_price_series(instrument_id, start, end).await
    }

    async fn history_end(&self, instrument_id: &str) -> Result<Option<NaiveDate>, AnalysisError> {
        self.inner.history_end(instrument_id).await
    }
}

#[tokio::test]
async fn test_panicked_worker_is_counted_invalid() {
    let ids = ["AAPL", "BOOM", "MSFT"];
    let prices = Arc::new(PanickingPrices {
        inner: flat_prices(&ids),
        broken: "BOOM",
    });
    let builder = SnapshotBuilder::new(
        orchestrator(vec![Arc::new(ScriptedProvider::new(Dimension::Pattern, 80.0))]),
        prices,
        universe(&ids),
    );

    let snapshot = builder.build_snapshot(d("2025-06-01")).await.unwrap();

    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot.summary.processed(), ids.len());
    assert_eq!(snapshot.summary.invalid, 1);
    assert_eq!(snapshot.summary.issues_for("BOOM")[0].kind, IssueKind::Invalid);
}

#[tokio::test]
async fn test_slow_provider_degrades_without_failing_the_build() {
    let ids = ["AAPL", "MSFT", "NVDA"];
    let builder = SnapshotBuilder::new(
        orchestrator(vec![
            Arc::new(ScriptedProvider::new(Dimension::Pattern, 80.0)),
            Arc::new(ScriptedProvider::new(Dimension::Sector, 70.0).slow(Duration::from_secs(2))),
        ]),
        flat_prices(&ids),
        universe(&ids),
    )
    .with_concurrency(3);

    let snapshot = builder.build_snapshot(d("2025-06-01")).await.unwrap();
    assert_eq!(snapshot.len(), 3);
    assert_eq!(snapshot.summary.degraded, 3);
    for entry in &snapshot.entries {
        assert!(entry.score.dimension_values()[&Dimension::Sector].degraded);
    }
}

#[tokio::test]
async fn test_rebuild_is_identical_and_served_from_cache() {
    let ids = ["AAPL", "MSFT", "NVDA", "AMD"];
    let pattern = Arc::new(ScriptedProvider::new(Dimension::Pattern, 80.0));
    let insider = Arc::new(ScriptedProvider::new(Dimension::Insider, 55.0));
    let builder = SnapshotBuilder::new(
        orchestrator(vec![Arc::clone(&pattern) as Arc<dyn DimensionProvider>, Arc::clone(&insider) as _]),
        flat_prices(&ids),
        universe(&ids),
    );
    let machine = TimeMachine::new(builder, Arc::new(MemorySnapshotStore::new()));

    let first = machine.get_or_build(d("2025-06-01"), false).await.unwrap();
    assert_eq!(pattern.calls(), 4);

    let stored = machine.get_or_build(d("2025-06-01"), false).await.unwrap();
    assert_eq!(stored.revision, 1);

    let rebuilt = machine.get_or_build(d("2025-06-01"), true).await.unwrap();
    assert_eq!(rebuilt.revision, 2);
    assert!(first.same_content(&rebuilt));
    // the rebuild never reached a provider
    assert_eq!(pattern.calls(), 4);
    assert_eq!(insider.calls(), 4);

    assert_eq!(machine.store().revisions(d("2025-06-01")).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_cancelled_build_stores_nothing() {
    let ids = ["AAPL", "MSFT"];
    let builder = SnapshotBuilder::new(
        orchestrator(vec![Arc::new(ScriptedProvider::new(Dimension::Pattern, 80.0))]),
        flat_prices(&ids),
        universe(&ids),
    );
    let cancel = builder.cancel_flag();
    let machine = TimeMachine::new(builder, Arc::new(MemorySnapshotStore::new()));

    machine.get_or_build(d("2025-05-01"), false).await.unwrap();
    cancel.store(true, Ordering::SeqCst);

    let result = machine
        .build_series(&[d("2025-05-01"), d("2025-06-01"), d("2025-07-01")], false)
        .await;
    assert!(matches!(result, Err(AnalysisError::Cancelled)));
    assert!(matches!(
        machine.builder().build_snapshot(d("2025-06-01")).await,
        Err(AnalysisError::Cancelled)
    ));
    assert_eq!(machine.store().dates().await.unwrap(), vec![d("2025-05-01")]);

    // resuming picks up the stored date and builds the missing ones
    cancel.store(false, Ordering::SeqCst);
    let series = machine
        .build_series(&[d("2025-05-01"), d("2025-06-01"), d("2025-07-01")], false)
        .await
        .unwrap();
    assert_eq!(series.len(), 3);
    assert!(series.iter().all(|s| s.revision == 1));
}

// Point-in-time purity over a randomized dataset.

fn random_date(rng: &mut StdRng, start: NaiveDate, span_days: i64) -> NaiveDate {
    start + chrono::Duration::days(rng.gen_range(0..span_days))
}

fn random_dataset(rng: &mut StdRng) -> HistoricalDataset {
    let start = d("2024-01-01");
    let span = 600;
    let sectors = ["tech", "energy", "health", "utilities", "finance"];
    let kinds = [CatalystKind::EarningsSurprise, CatalystKind::AnalystUpgrade];

    let mut dataset = HistoricalDataset::default();
    for (i, sector) in sectors.iter().enumerate() {
        let readings: Vec<SectorReading> = (0..20)
            .map(|_| SectorReading {
                observed_on: random_date(rng, start, span),
                return_3m_pct: rng.gen_range(-15.0..15.0),
            })
            .collect();
        dataset.sectors.insert(sector.to_string(), readings);

        for j in 0..2 {
            let mut price = 50.0;
            let prices: Vec<PricePoint> = (0..span)
                .map(|day| {
                    price *= 1.0 + rng.gen_range(-0.03..0.032);
                    PricePoint { date: start + chrono::Duration::days(day), price }
                })
                .collect();
            let insider_transactions: Vec<InsiderTransaction> = (0..6)
                .map(|_| {
                    let filed_on = random_date(rng, start, span);
                    InsiderTransaction {
                        filed_on,
                        traded_on: filed_on - chrono::Duration::days(2),
                        insider: "director".into(),
                        shares: rng.gen_range(100.0..10_000.0),
                        is_purchase: rng.gen_bool(0.6),
                    }
                })
                .collect();
            let institutional_filings: Vec<InstitutionalFiling> = (0..6)
                .map(|_| {
                    let filed_on = random_date(rng, start, span);
                    InstitutionalFiling {
                        filed_on,
                        period_end: filed_on - chrono::Duration::days(45),
                        ownership_pct: rng.gen_range(20.0..90.0),
                        holder_count: rng.gen_range(50..900),
                    }
                })
                .collect();
            let fundamentals: Vec<FundamentalReport> = (0..6)
                .map(|_| FundamentalReport {
                    published_on: random_date(rng, start, span),
                    revenue_growth_pct: rng.gen_range(-10.0..40.0),
                    eps_growth_pct: rng.gen_range(-30.0..50.0),
                    return_on_equity_pct: rng.gen_range(0.0..35.0),
                    debt_to_equity: rng.gen_range(0.0..3.0),
                })
                .collect();
            let events: Vec<CatalystRecord> = (0..4)
                .map(|k| CatalystRecord {
                    published_on: random_date(rng, start, span),
                    kind: kinds[k % 2],
                    description: String::new(),
                })
                .collect();

            dataset.instruments.insert(
                format!("I{i}{j}"),
                InstrumentHistory {
                    sector: sector.to_string(),
                    prices,
                    insider_transactions,
                    institutional_filings,
                    fundamentals,
                    events,
                },
            );
        }
    }
    dataset.normalize();
    dataset
}

/// The dataset as it existed on `as_of`: every record not yet public removed.
fn truncated(dataset: &HistoricalDataset, as_of: NaiveDate) -> HistoricalDataset {
    let instruments: BTreeMap<_, _> = dataset
        .instruments
        .iter()
        .map(|(id, h)| {
            let history = InstrumentHistory {
                sector: h.sector.clone(),
                prices: h.prices.iter().filter(|p| p.date <= as_of).cloned().collect(),
                insider_transactions: h.insider_transactions.iter().filter(|t| t.filed_on <= as_of).cloned().collect(),
                institutional_filings: h.institutional_filings.iter().filter(|f| f.filed_on <= as_of).cloned().collect(),
                fundamentals: h.fundamentals.iter().filter(|r| r.published_on <= as_of).cloned().collect(),
                events: h.events.iter().filter(|e| e.published_on <= as_of).cloned().collect(),
            };
            (id.clone(), history)
        })
        .collect();
    let sectors = dataset
        .sectors
        .iter()
        .map(|(name, readings)| {
            (name.clone(), readings.iter().filter(|r| r.observed_on <= as_of).cloned().collect())
        })
        .collect();
    HistoricalDataset { instruments, sectors }
}

fn dataset_builder(dataset: HistoricalDataset) -> SnapshotBuilder {
    let dataset = Arc::new(dataset);
    let ids = dataset.instrument_ids();
    SnapshotBuilder::new(
        orchestrator(standard_providers(Arc::clone(&dataset))),
        Arc::new(DatasetPriceLookup::new(dataset)),
        ids,
    )
}

#[tokio::test]
async fn test_snapshot_matches_build_from_truncated_history() {
    let mut rng = StdRng::seed_from_u64(7);
    let dataset = random_dataset(&mut rng);
    let full = dataset_builder(dataset.clone());

    for _ in 0..25 {
        let as_of = random_date(&mut rng, d("2024-02-01"), 560);
        let snapshot = full.build_snapshot(as_of).await.unwrap();

        assert_eq!(snapshot.summary.rejected, 0, "look-ahead at {as_of}");
        for entry in &snapshot.entries {
            assert!(entry.price_as_of.map_or(true, |p| p <= as_of));
            for value in entry.score.dimension_values().values() {
                assert!(value.data_as_of.map_or(true, |stamp| stamp <= as_of));
            }
        }

        let past_only = dataset_builder(truncated(&dataset, as_of)).build_snapshot(as_of).await.unwrap();
        assert!(snapshot.same_content(&past_only), "future data changed the {as_of} snapshot");
    }
}

#[tokio::test]
async fn test_dataset_snapshot_is_idempotent() {
    let mut rng = StdRng::seed_from_u64(11);
    let builder = dataset_builder(random_dataset(&mut rng));
    let a = builder.build_snapshot(d("2025-01-15")).await.unwrap();
    let b = builder.build_snapshot(d("2025-01-15")).await.unwrap();
    assert_eq!(a, b);
    assert!(!a.is_empty());
}
