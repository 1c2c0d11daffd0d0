//! Retry with exponential backoff for calls to the external services.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::warn;

use crate::error::{ExtractionError, StructuringError};
use crate::models::config::RetryConfig;

/// Error types the retry policy can classify.
pub trait Retryable: fmt::Display {
    /// Whether another attempt may succeed.
    fn is_transient(&self) -> bool;

    /// The error reported when one attempt exceeds its time budget.
    fn timed_out(after: Duration) -> Self;
}

impl Retryable for ExtractionError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    fn timed_out(after: Duration) -> Self {
        Self::Transient(format!("timed out after {}s", after.as_secs()))
    }
}

impl Retryable for StructuringError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    fn timed_out(after: Duration) -> Self {
        Self::Transient(format!("timed out after {}s", after.as_secs()))
    }
}

/// Failure class of an HTTP response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
}

/// Classify a non-success HTTP status.
///
/// Request timeouts, throttling and server errors are transient; everything else
/// (auth, rejected document, bad request) is permanent.
pub fn classify_status(status: StatusCode) -> ErrorClass {
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        ErrorClass::Transient
    } else {
        ErrorClass::Permanent
    }
}

/// Classify a transport-level reqwest error.
pub fn classify_transport(err: &reqwest::Error) -> ErrorClass {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        ErrorClass::Transient
    } else if let Some(status) = err.status() {
        classify_status(status)
    } else {
        ErrorClass::Permanent
    }
}

/// Bounded retry with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.multiplier.max(1.0),
        }
    }
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.saturating_sub(1) as i32);
        let millis = self.initial_backoff.as_millis() as f64 * factor;
        Duration::from_millis(millis.min(self.max_backoff.as_millis() as f64) as u64)
    }

    /// Run `op` until it succeeds, fails permanently, or attempts run out.
    ///
    /// Each attempt is bounded by `attempt_timeout`; an elapsed attempt counts as a
    /// transient failure.
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        attempt_timeout: Duration,
        mut op: F,
    ) -> Result<T, E>
    where
        E: Retryable,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            let outcome = match tokio::time::timeout(attempt_timeout, op()).await {
                Ok(outcome) => outcome,
                Err(_) => Err(E::timed_out(attempt_timeout)),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts = self.max_attempts,
                        "{} failed: {}; retrying in {:?}",
                        label,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(250),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(StatusCode::UNAUTHORIZED), ErrorClass::Permanent);
        assert_eq!(classify_status(StatusCode::FORBIDDEN), ErrorClass::Permanent);
        assert_eq!(classify_status(StatusCode::UNSUPPORTED_MEDIA_TYPE), ErrorClass::Permanent);
        assert_eq!(classify_status(StatusCode::BAD_REQUEST), ErrorClass::Permanent);
        assert_eq!(classify_status(StatusCode::REQUEST_TIMEOUT), ErrorClass::Transient);
        assert_eq!(classify_status(StatusCode::TOO_MANY_REQUESTS), ErrorClass::Transient);
        assert_eq!(classify_status(StatusCode::BAD_GATEWAY), ErrorClass::Transient);
    }

    #[test]
    fn test_backoff_is_capped() {
        let p = policy(5);
        assert_eq!(p.backoff(1), Duration::from_millis(100));
        assert_eq!(p.backoff(2), Duration::from_millis(200));
        assert_eq!(p.backoff(3), Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let calls = &AtomicU32::new(0);
        let result: Result<&str, ExtractionError> = policy(3)
            .run("extract", Duration::from_secs(1), move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ExtractionError::Transient("503".to_string()))
                } else {
                    Ok("text")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "text");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_is_not_retried() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), StructuringError> = policy(3)
            .run("structure", Duration::from_secs(1), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(StructuringError::Permanent("401".to_string()))
            })
            .await;

        assert!(matches!(result, Err(StructuringError::Permanent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_transient() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), ExtractionError> = policy(2)
            .run("extract", Duration::from_secs(5), move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(ExtractionError::Transient(msg)) if msg.contains("timed out")));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
