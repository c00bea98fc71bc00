// Copyright (c) SnapSentry Contributors
// SPDX-License-Identifier: Apache-2.0

//! Retry executor wrapping every backend call.
//!
//! An operation runs until it succeeds, fails with a non-retriable error, or exhausts its
//! retries, bounded in real time by a per-operation timeout and an optional caller deadline.
//! Delays between attempts follow [`ExponentialBackoff`] and are themselves cancellable by the
//! deadline.

use std::{future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use snapsentry_utils::backoff::ExponentialBackoff;
use tokio::time::{sleep, timeout_at, Instant};

use crate::error::BackendError;

/// Parameters for the exponential backoff and retry mechanism.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// The maximum number of additional attempts after the initial failure.
    ///
    /// With `max_retries = 3` the operation runs at most 4 times.
    pub max_retries: u32,
    /// The wait before the first retry; doubles with each subsequent attempt.
    #[serde(rename = "base_delay_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub base_delay: Duration,
    /// Hard cap on the wait between attempts, applied after jitter.
    #[serde(rename = "max_delay_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub max_delay: Duration,
    /// Total real-time limit for the operation, including all retries and sleeps.
    #[serde(rename = "operation_timeout_secs")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub operation_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            operation_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// A configuration suited to short-lived interactive commands.
    pub fn interactive() -> Self {
        Self {
            max_retries: 1,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(2),
            operation_timeout: Duration::from_secs(10),
        }
    }
}

/// Runs `operation` with retries until success, a fatal error, or the deadline.
///
/// The effective deadline is the sooner of `deadline` and now plus the configured operation
/// timeout. A retriable failure sleeps for the next backoff delay before the following attempt;
/// the sleep is cut short (and the operation fails) when the deadline fires first.
pub async fn execute<T, F, Fut>(
    config: &RetryConfig,
    deadline: Option<Instant>,
    operation_name: &'static str,
    mut operation: F,
) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let started = Instant::now();
    let op_deadline = started + config.operation_timeout;
    let deadline = deadline.map_or(op_deadline, |outer| outer.min(op_deadline));

    let mut backoff = ExponentialBackoff::new(config.base_delay, config.max_delay);
    let mut last_error = None;

    for attempt in 0..=config.max_retries {
        if Instant::now() >= deadline {
            return Err(BackendError::TimedOutBeforeAttempt {
                operation: operation_name,
                attempt: attempt + 1,
            });
        }

        match timeout_at(deadline, operation()).await {
            Err(_) => {
                return Err(BackendError::DeadlineExceeded {
                    operation: operation_name,
                    elapsed: started.elapsed(),
                });
            }
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(error)) if !error.is_retriable() => return Err(error),
            Ok(Err(error)) => {
                if attempt == config.max_retries {
                    last_error = Some(error);
                    break;
                }

                tracing::warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_retries = config.max_retries,
                    %error,
                    "transient backend error, scheduling retry"
                );
                last_error = Some(error);

                let delay = backoff.next_delay();
                if timeout_at(deadline, sleep(delay)).await.is_err() {
                    return Err(BackendError::CancelledDuringBackoff {
                        operation: operation_name,
                    });
                }
            }
        }
    }

    Err(BackendError::RetriesExhausted {
        operation: operation_name,
        retries: config.max_retries,
        source: Box::new(last_error.expect("an error is always recorded before exhaustion")),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    use reqwest::StatusCode;

    use super::*;

    fn test_config() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            operation_timeout: Duration::from_secs(300),
        }
    }

    fn status_error(code: u16) -> BackendError {
        BackendError::Status {
            operation: "test-op",
            status: StatusCode::from_u16(code).unwrap(),
            message: String::new(),
            request_id: None,
        }
    }

    /// Returns an operation that fails `failures` times with the given status, then succeeds,
    /// along with the shared invocation counter.
    fn flaky_operation(
        failures: u32,
        code: u16,
    ) -> (
        Arc<AtomicU32>,
        impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<u32, BackendError>> + Send>>,
    ) {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let operation = move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Box::pin(async move {
                if n <= failures {
                    Err(status_error(code))
                } else {
                    Ok(n)
                }
            }) as std::pin::Pin<Box<dyn Future<Output = _> + Send>>
        };
        (calls, operation)
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let (calls, operation) = flaky_operation(2, 503);
        let started = Instant::now();

        let result = execute(&test_config(), None, "flaky", operation).await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two backoff sleeps of at least base and 2x base respectively.
        assert!(started.elapsed() >= Duration::from_secs(6));
        assert!(started.elapsed() < Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retriable_error_runs_exactly_once() {
        let (calls, operation) = flaky_operation(10, 404);

        let result = execute(&test_config(), None, "fatal", operation).await;

        assert!(matches!(result, Err(BackendError::Status { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_retries_and_reports_the_last_error() {
        let (calls, operation) = flaky_operation(10, 503);

        let result = execute(&test_config(), None, "always-failing", operation).await;

        assert_eq!(calls.load(Ordering::SeqCst), 4, "1 initial + 3 retries");
        match result {
            Err(BackendError::RetriesExhausted {
                retries, source, ..
            }) => {
                assert_eq!(retries, 3);
                assert!(matches!(*source, BackendError::Status { .. }));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn operation_timeout_bounds_total_time() {
        let config = RetryConfig {
            operation_timeout: Duration::from_secs(5),
            ..test_config()
        };
        let (_, operation) = flaky_operation(u32::MAX, 503);
        let started = Instant::now();

        let result = execute(&config, None, "slow", operation).await;

        assert!(result.is_err());
        assert!(started.elapsed() <= Duration::from_secs(5) + Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn caller_deadline_wins_when_sooner() {
        // Sooner than the first backoff delay, so the sleep is what gets cancelled.
        let deadline = Instant::now() + Duration::from_secs(1);
        let (calls, operation) = flaky_operation(u32::MAX, 503);

        let result = execute(&test_config(), Some(deadline), "bounded", operation).await;

        assert!(matches!(
            result,
            Err(BackendError::CancelledDuringBackoff { .. })
        ));
        // The first attempt ran; the deadline fired during the first backoff sleep.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_deadline_fails_before_the_first_attempt() {
        let deadline = Instant::now();
        tokio::time::advance(Duration::from_millis(1)).await;
        let (calls, operation) = flaky_operation(0, 503);

        let result = execute(&test_config(), Some(deadline), "expired", operation).await;

        assert!(matches!(
            result,
            Err(BackendError::TimedOutBeforeAttempt { attempt: 1, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_attempt_is_cancelled_at_the_deadline() {
        let config = RetryConfig {
            operation_timeout: Duration::from_secs(2),
            ..test_config()
        };

        let result: Result<(), _> = execute(&config, None, "hung", || async {
            sleep(Duration::from_secs(3600)).await;
            Ok(())
        })
        .await;

        assert!(matches!(result, Err(BackendError::DeadlineExceeded { .. })));
    }

    #[test]
    fn config_defaults_round_trip_through_yaml() {
        let config = RetryConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: RetryConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }
}
