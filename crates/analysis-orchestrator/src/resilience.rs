use std::future::Future;
use std::time::Duration;

use analysis_core::AnalysisError;

/// Retry, backoff and timeout applied around every provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResiliencePolicy {
    /// Total attempts, first call included. At least 1.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each one after.
    pub base_backoff: Duration,
    /// Hard limit on a single attempt.
    pub timeout: Duration,
}

impl Default for ResiliencePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(250),
            timeout: Duration::from_secs(5),
        }
    }
}

impl ResiliencePolicy {
    /// Delay before `attempt` (1-based). Attempt 1 runs immediately.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        self.base_backoff.saturating_mul(1u32 << (attempt - 2).min(16))
    }

    pub async fn call<T, F, Fut>(&self, origin: &str, mut op: F) -> Result<T, AnalysisError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AnalysisError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let outcome = match tokio::time::timeout(self.timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(AnalysisError::Timeout {
                    origin: origin.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                }),
            };

            match outcome {
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    attempt += 1;
                    let wait = self.backoff_for(attempt);
                    tracing::debug!(
                        "{} failed ({}), retry {}/{} in {:?}",
                        origin,
                        e,
                        attempt,
                        max_attempts,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                }
                other => return other,
            }
        }
    }
}
