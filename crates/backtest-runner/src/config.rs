use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use analysis_orchestrator::ResiliencePolicy;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{NaiveDate, Utc};
use time_machine::Cadence;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub dataset_path: PathBuf,
    pub database_url: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub cadence: Cadence,
    pub worker_concurrency: usize,
    pub provider_timeout: Duration,
    pub provider_max_attempts: u32,
    pub provider_backoff: Duration,
    pub force_rebuild: bool,
    /// Max entries printed by `rank`
    pub rank_limit: usize,
}

impl RunnerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let end = match get("BACKTEST_END") {
            Some(raw) => parse_date("BACKTEST_END", &raw)?,
            None => Utc::now().date_naive(),
        };
        let start = match get("BACKTEST_START") {
            Some(raw) => parse_date("BACKTEST_START", &raw)?,
            None => end - chrono::Duration::days(365),
        };

        let config = Self {
            dataset_path: get("DATASET_PATH")
                .map(PathBuf::from)
                .context("DATASET_PATH not set")?,
            database_url: get("DATABASE_URL").unwrap_or_else(|| "sqlite:snapshots.db".to_string()),
            start,
            end,
            cadence: parse_or(&get, "SNAPSHOT_CADENCE", Cadence::Weekly)?,
            worker_concurrency: parse_or(&get, "WORKER_CONCURRENCY", 8)?,
            provider_timeout: Duration::from_millis(parse_or(&get, "PROVIDER_TIMEOUT_MS", 5000)?),
            provider_max_attempts: parse_or(&get, "PROVIDER_MAX_ATTEMPTS", 3)?,
            provider_backoff: Duration::from_millis(parse_or(&get, "PROVIDER_BACKOFF_MS", 250)?),
            force_rebuild: parse_or(&get, "FORCE_REBUILD", false)?,
            rank_limit: parse_or(&get, "RANK_LIMIT", 25)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.end < self.start {
            bail!("BACKTEST_END ({}) is before BACKTEST_START ({})", self.end, self.start);
        }
        if self.worker_concurrency == 0 {
            bail!("WORKER_CONCURRENCY must be at least 1");
        }
        if self.provider_max_attempts == 0 {
            bail!("PROVIDER_MAX_ATTEMPTS must be at least 1");
        }
        if self.provider_timeout.is_zero() {
            bail!("PROVIDER_TIMEOUT_MS must be positive");
        }
        Ok(())
    }

    pub fn resilience_policy(&self) -> ResiliencePolicy {
        ResiliencePolicy {
            max_attempts: self.provider_max_attempts,
            base_backoff: self.provider_backoff,
            timeout: self.provider_timeout,
        }
    }
}

fn parse_date(key: &str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").with_context(|| format!("{key}: expected YYYY-MM-DD, got {raw:?}"))
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match get(key) {
        Some(raw) => raw.trim().parse().map_err(|e| anyhow!("{key}: {e}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = RunnerConfig::from_lookup(lookup(&[
            ("DATASET_PATH", "data/history.json"),
            ("BACKTEST_START", "2025-01-01"),
            ("BACKTEST_END", "2025-06-30"),
        ]))
        .unwrap();

        assert_eq!(config.database_url, "sqlite:snapshots.db");
        assert_eq!(config.cadence, Cadence::Weekly);
        assert_eq!(config.worker_concurrency, 8);
        assert_eq!(config.provider_timeout, Duration::from_millis(5000));
        assert_eq!(config.provider_max_attempts, 3);
        assert_eq!(config.provider_backoff, Duration::from_millis(250));
        assert!(!config.force_rebuild);
        assert_eq!(config.resilience_policy(), ResiliencePolicy::default());
    }

    #[test]
    fn test_overrides() {
        let config = RunnerConfig::from_lookup(lookup(&[
            ("DATASET_PATH", "d.json"),
            ("DATABASE_URL", "sqlite::memory:"),
            ("BACKTEST_START", "2025-01-01"),
            ("BACKTEST_END", "2025-01-01"),
            ("SNAPSHOT_CADENCE", "monthly"),
            ("WORKER_CONCURRENCY", "2"),
            ("PROVIDER_TIMEOUT_MS", "100"),
            ("FORCE_REBUILD", "true"),
        ]))
        .unwrap();

        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.cadence, Cadence::Monthly);
        assert_eq!(config.worker_concurrency, 2);
        assert_eq!(config.provider_timeout, Duration::from_millis(100));
        assert!(config.force_rebuild);
    }

    #[test]
    fn test_missing_dataset_path() {
        let err = RunnerConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("DATASET_PATH"));
    }

    #[test]
    fn test_rejects_invalid_values() {
        let base = [("DATASET_PATH", "d.json"), ("BACKTEST_START", "2025-02-01")];

        let reversed = RunnerConfig::from_lookup(lookup(&[base[0], base[1], ("BACKTEST_END", "2025-01-01")]));
        assert!(reversed.unwrap_err().to_string().contains("before"));

        let zero_workers = RunnerConfig::from_lookup(lookup(&[
            base[0],
            base[1],
            ("BACKTEST_END", "2025-03-01"),
            ("WORKER_CONCURRENCY", "0"),
        ]));
        assert!(zero_workers.is_err());

        let zero_attempts = RunnerConfig::from_lookup(lookup(&[
            base[0],
            base[1],
            ("BACKTEST_END", "2025-03-01"),
            ("PROVIDER_MAX_ATTEMPTS", "0"),
        ]));
        assert!(zero_attempts.is_err());

        let bad_cadence = RunnerConfig::from_lookup(lookup(&[base[0], ("SNAPSHOT_CADENCE", "hourly")]));
        assert!(bad_cadence.unwrap_err().to_string().contains("SNAPSHOT_CADENCE"));

        let bad_date = RunnerConfig::from_lookup(lookup(&[base[0], ("BACKTEST_END", "06/30/2025")]));
        assert!(bad_date.is_err());
    }
}
