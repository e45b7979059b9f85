//! Transport wrappers around a [`ReasoningService`]: bounded retries and a
//! minimum interval between calls.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::RetryPolicy;
use crate::conversation::{ModelRequest, ModelResponse, ReasoningService};
use crate::error::ServiceError;

/// Retries transient failures of the inner service.
///
/// Each attempt runs under [`RetryPolicy::call_timeout`]. Rate limits back
/// off linearly (`base * attempt`); connection failures and timeouts wait
/// `base`; API errors are returned at once.
pub struct RetryingService<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S> RetryingService<S> {
    /// Wraps `inner` with `policy`.
    #[must_use]
    pub const fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// The wrapped service.
    #[must_use]
    pub const fn inner(&self) -> &S {
        &self.inner
    }

    fn backoff(&self, error: &ServiceError, attempt: u32) -> Duration {
        match error {
            ServiceError::RateLimited(_) => self.policy.base_delay * attempt,
            _ => self.policy.base_delay,
        }
    }
}

#[async_trait]
impl<S: ReasoningService> ReasoningService for RetryingService<S> {
    async fn send(&self, request: &ModelRequest<'_>) -> Result<ModelResponse, ServiceError> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let outcome = tokio::time::timeout(self.policy.call_timeout, self.inner.send(request))
                .await
                .unwrap_or(Err(ServiceError::Timeout(self.policy.call_timeout)));

            match outcome {
                Ok(response) => return Ok(response),
                Err(error) if error.is_retryable() && attempt < max_attempts => {
                    let delay = self.backoff(&error, attempt);
                    tracing::warn!(
                        event = "transport_retry",
                        attempt,
                        max_attempts,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %error,
                        "Reasoning service call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    tracing::error!(
                        event = "transport_failed",
                        attempt,
                        error = %error,
                        "Reasoning service call failed"
                    );
                    return Err(error);
                }
            }
        }
    }
}

/// Minimum-interval gate shared by every caller in a batch.
#[derive(Debug)]
pub struct Throttle {
    min_interval: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Throttle {
    /// Creates a gate allowing one call per `min_interval`.
    #[must_use]
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_call: Mutex::const_new(None),
        }
    }

    /// Waits until a call is allowed and claims the slot.
    ///
    /// The lock is held while waiting so concurrent callers queue up in turn.
    pub async fn acquire(&self) {
        let mut last_call = self.last_call.lock().await;
        if let Some(last) = *last_call {
            let ready_at = last + self.min_interval;
            let now = Instant::now();
            if ready_at > now {
                tracing::debug!(
                    event = "throttle_wait",
                    wait_ms = u64::try_from((ready_at - now).as_millis()).unwrap_or(u64::MAX),
                    "Waiting for the call interval"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last_call = Some(Instant::now());
    }
}

/// Passes every call through a shared [`Throttle`].
pub struct ThrottledService<S> {
    inner: S,
    throttle: Arc<Throttle>,
}

impl<S> ThrottledService<S> {
    /// Wraps `inner` behind `throttle`.
    #[must_use]
    pub const fn new(inner: S, throttle: Arc<Throttle>) -> Self {
        Self { inner, throttle }
    }
}

#[async_trait]
impl<S: ReasoningService> ReasoningService for ThrottledService<S> {
    async fn send(&self, request: &ModelRequest<'_>) -> Result<ModelResponse, ServiceError> {
        self.throttle.acquire().await;
        self.inner.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    struct Flaky {
        failures: Vec<ServiceError>,
        calls: AtomicU32,
    }

    impl Flaky {
        fn new(failures: Vec<ServiceError>) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReasoningService for Flaky {
        async fn send(&self, _request: &ModelRequest<'_>) -> Result<ModelResponse, ServiceError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            self.failures
                .get(call)
                .map_or_else(|| Ok(ModelResponse::default()), |e| Err(e.clone()))
        }
    }

    struct Hung;

    #[async_trait]
    impl ReasoningService for Hung {
        async fn send(&self, _request: &ModelRequest<'_>) -> Result<ModelResponse, ServiceError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(ModelResponse::default())
        }
    }

    fn request() -> ModelRequest<'static> {
        ModelRequest {
            system: "",
            history: &[],
            tools: &[],
            max_output_tokens: 16,
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy::default()
            .with_base_delay(Duration::from_secs(2))
            .with_call_timeout(Duration::from_secs(30))
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_errors_retry_with_constant_delay() {
        let service = RetryingService::new(
            Flaky::new(vec![
                ServiceError::Connection("reset".into()),
                ServiceError::Timeout(Duration::ZERO),
            ]),
            policy(),
        );
        let start = Instant::now();
        assert!(service.send(&request()).await.is_ok());
        assert_eq!(service.inner().calls(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limits_back_off_linearly() {
        let service = RetryingService::new(
            Flaky::new(vec![
                ServiceError::RateLimited("429".into()),
                ServiceError::RateLimited("429".into()),
            ]),
            policy(),
        );
        let start = Instant::now();
        assert!(service.send(&request()).await.is_ok());
        assert_eq!(start.elapsed(), Duration::from_secs(2 + 4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_api_errors_are_not_retried() {
        let service =
            RetryingService::new(Flaky::new(vec![ServiceError::Api("401".into())]), policy());
        assert_eq!(service.send(&request()).await.unwrap_err(), ServiceError::Api("401".into()));
        assert_eq!(service.inner().calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempts_are_bounded() {
        let failures = vec![ServiceError::Connection("down".into()); 5];
        let service = RetryingService::new(Flaky::new(failures), policy());
        assert!(matches!(service.send(&request()).await, Err(ServiceError::Connection(_))));
        assert_eq!(service.inner().calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_service_times_out() {
        let service = RetryingService::new(Hung, policy());
        let start = Instant::now();
        let error = service.send(&request()).await.unwrap_err();
        assert_eq!(error, ServiceError::Timeout(Duration::from_secs(30)));
        assert_eq!(start.elapsed(), Duration::from_secs(30 * 3 + 2 * 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_spaces_calls() {
        let throttle = Arc::new(Throttle::new(Duration::from_secs(1)));
        let service = ThrottledService::new(Flaky::new(Vec::new()), Arc::clone(&throttle));
        let start = Instant::now();
        for _ in 0..3 {
            service.send(&request()).await.unwrap();
        }
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }
}
