//! Bounded retry with exponential backoff.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Errors that know whether repeating the call may succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Retry settings for a single logical network call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_backoff_ms: u64,
    /// Multiplier applied to the delay after each failed attempt.
    pub backoff_multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 5_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_initial_backoff_ms(mut self, initial_backoff_ms: u64) -> Self {
        self.initial_backoff_ms = initial_backoff_ms;
        self
    }

    /// Delay to wait after the given (1-based) failed attempt.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent: i32 = attempt.saturating_sub(1).min(30) as i32;
        let delay: f64 = self.initial_backoff_ms as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_millis(delay.min(self.max_backoff_ms as f64) as u64)
    }
}

/// Run `call` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent.
///
/// # Returns
/// The final result together with the number of attempts made.
pub async fn retry_counted<T, E, F, Fut>(
    settings: &RetrySettings,
    operation: &str,
    mut call: F,
) -> (Result<T, E>, u32)
where
    E: Retryable + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts: u32 = settings.max_attempts.max(1);
    let mut attempt: u32 = 1;

    loop {
        match call().await {
            Ok(value) => return (Ok(value), attempt),
            Err(err) if attempt < max_attempts && err.is_retryable() => {
                let delay: Duration = settings.backoff_for(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return (Err(err), attempt),
        }
    }
}

/// [`retry_counted`] without the attempt count.
pub async fn retry_with_backoff<T, E, F, Fut>(
    settings: &RetrySettings,
    operation: &str,
    call: F,
) -> Result<T, E>
where
    E: Retryable + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_counted(settings, operation, call).await.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct Flaky {
        transient: bool,
    }

    impl Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky(transient={})", self.transient)
        }
    }

    impl Retryable for Flaky {
        fn is_retryable(&self) -> bool {
            self.transient
        }
    }

    fn fast(max_attempts: u32) -> RetrySettings {
        RetrySettings::default()
            .with_max_attempts(max_attempts)
            .with_initial_backoff_ms(1)
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let settings: RetrySettings = RetrySettings {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 300,
            backoff_multiplier: 2.0,
        };
        assert_eq!(settings.backoff_for(1), Duration::from_millis(100));
        assert_eq!(settings.backoff_for(2), Duration::from_millis(200));
        assert_eq!(settings.backoff_for(3), Duration::from_millis(300));
        assert_eq!(settings.backoff_for(10), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let counter: AtomicU32 = AtomicU32::new(0);
        let calls: &AtomicU32 = &counter;
        let (result, attempts): (Result<u32, Flaky>, u32) = retry_counted(&fast(3), "put", || async move {
            let n: u32 = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n < 3 {
                Err(Flaky { transient: true })
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let counter: AtomicU32 = AtomicU32::new(0);
        let calls: &AtomicU32 = &counter;
        let (result, attempts): (Result<(), Flaky>, u32) =
            retry_counted(&fast(3), "put", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Flaky { transient: true })
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_definitive_error_is_not_retried() {
        let counter: AtomicU32 = AtomicU32::new(0);
        let calls: &AtomicU32 = &counter;
        let result: Result<(), Flaky> = retry_with_backoff(&fast(5), "submit", || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Flaky { transient: false })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
