//! Bounded retry with exponential backoff for transient network failures.
//!
//! Provider 4xx/5xx responses and credential errors are never retried here;
//! only transport failures where no HTTP response arrived at all.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use paperbase_common::Result;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first try.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Multiplier for exponential backoff.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Create a new retry configuration.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
        }
    }

    /// Set the delay before the first retry.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Calculate the delay for a given attempt number.
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let millis =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(millis as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(2)
    }
}

/// Run an operation, retrying transient transport errors only.
pub async fn retry_with_config<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if err.is_transient() && attempt < config.max_retries => {
                let delay = config.delay_for_attempt(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "Transient failure, retrying: {}",
                    err
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paperbase_common::Error;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryConfig {
        RetryConfig::new(2).with_initial_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let attempts = AtomicU32::new(0);

        let result = retry_with_config(&fast(), || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(Error::Network("connection reset".to_string()))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_transient_errors_are_not_retried() {
        let attempts = AtomicU32::new(0);

        let result: Result<()> = retry_with_config(&fast(), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::ProviderApi {
                status: 503,
                body: "upstream down".to_string(),
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_last_error() {
        let attempts = AtomicU32::new(0);

        let result: Result<()> = retry_with_config(&fast(), || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(Error::Network("timed out".to_string()))
        })
        .await;

        assert!(matches!(result, Err(Error::Network(_))));
        // One initial try plus two retries.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }
}
