use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;

use crate::client::ApiClient;
use crate::client::RequestError;
use crate::client::RequestSpec;
use crate::outputter;

pub const HEALTH_PATH: &str = "/actuator/health";

/// Bounded retry with a fixed delay between attempts. The same policy is
/// shared by the readiness gate and every lifecycle step; callers that need
/// something different pass their own.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    /// At least one attempt is always made.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(10))
    }
}

#[derive(Error, Debug)]
pub enum RetryError {
    #[error("giving up after {attempts} attempts")]
    Exhausted {
        attempts: u32,
        #[source]
        last: RequestError,
    },

    #[error("interrupted while waiting to retry")]
    Interrupted,
}

/// Runs `op` until it succeeds or the policy is spent, preserving the last
/// cause on exhaustion. Every failure is treated as retryable, matching how
/// the suite has always behaved; [`run_with_retry_when`] is the hook for
/// bailing out early on failures that will never resolve.
pub async fn run_with_retry<T, F, Fut>(policy: &RetryPolicy, op: F) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
{
    run_with_retry_when(policy, op, |_| true).await
}

pub async fn run_with_retry_when<T, F, Fut, P>(
    policy: &RetryPolicy,
    mut op: F,
    mut retryable: P,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestError>>,
    P: FnMut(&RequestError) -> bool,
{
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && retryable(&err) => {
                outputter::warn(&format!(
                    "attempt {attempt} failed ({err}), retrying in {:?}...",
                    policy.delay
                ));
                wait_before_retry(policy.delay).await?;
                attempt += 1;
            }
            Err(err) => {
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    last: err,
                });
            }
        }
    }
}

/// The only suspension point in the retry loop. A ctrl-c that lands during
/// the delay aborts the remaining attempts instead of letting the loop
/// carry on as if nothing happened.
async fn wait_before_retry(delay: Duration) -> Result<(), RetryError> {
    tokio::select! {
        _ = sleep(delay) => Ok(()),
        _ = tokio::signal::ctrl_c() => Err(RetryError::Interrupted),
    }
}

/// Blocks until the service answers its health probe, or gives up. Nothing
/// else runs before this has succeeded.
pub async fn await_ready(client: &ApiClient, policy: &RetryPolicy) -> Result<(), RetryError> {
    let probe = RequestSpec::get(HEALTH_PATH);
    let probe = &probe;

    run_with_retry(policy, move || async move {
        client.execute(probe).await.map(|_| ())
    })
    .await
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::sync::atomic::AtomicU32;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use reqwest::StatusCode;

    use crate::client::RequestError;
    use crate::retry::RetryError;
    use crate::retry::RetryPolicy;
    use crate::retry::run_with_retry;
    use crate::retry::run_with_retry_when;

    fn status_mismatch() -> RequestError {
        RequestError::StatusMismatch {
            expected: StatusCode::OK,
            actual: StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn quick(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::ZERO)
    }

    #[tokio::test]
    async fn first_success_returns_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = run_with_retry(&quick(5), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(7)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result = run_with_retry(&quick(5), move || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 { Err(status_mismatch()) } else { Ok(n) }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_the_attempt_count_and_last_cause() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = run_with_retry(&quick(3), move || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(status_mismatch())
            }
        })
        .await;

        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(last, RequestError::StatusMismatch { .. }));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn fatal_failures_short_circuit_with_a_classifier() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = run_with_retry_when(
            &quick(5),
            move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(status_mismatch())
                }
            },
            |_| false,
        )
        .await;

        assert!(matches!(
            result,
            Err(RetryError::Exhausted { attempts: 1, .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_k_failures_waits_exactly_k_delays() {
        let delay = Duration::from_secs(10);
        let policy = RetryPolicy::new(5, delay);
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);

        let started = tokio::time::Instant::now();

        let result = run_with_retry(&policy, move || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 { Err(status_mismatch()) } else { Ok(n) }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        // Two failures mean two delays; success returns with no further
        // delay
        assert_eq!(started.elapsed(), delay * 2);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_waits_one_delay_less_than_the_attempt_count() {
        let delay = Duration::from_secs(10);
        let policy = RetryPolicy::new(3, delay);

        let started = tokio::time::Instant::now();

        let result: Result<(), _> =
            run_with_retry(&policy, || async { Err(status_mismatch()) }).await;

        assert!(matches!(
            result,
            Err(RetryError::Exhausted { attempts: 3, .. })
        ));
        // No delay after the final failed attempt
        assert_eq!(started.elapsed(), delay * 2);
    }

    #[test]
    fn policy_always_allows_at_least_one_attempt() {
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
