use std::future::Future;
use std::time::Duration;

pub mod limiter;
pub mod retry;

pub use limiter::RateLimiter;
pub use retry::{backoff_delay, classify, classify_message, classify_status_code, retry_with_backoff, Retrier, RetryContext};

use crate::config::LimitsConfig;
use crate::Result;

/// One shared limiter per upstream provider, built once at startup and injected.
#[derive(Clone)]
pub struct Limiters {
    pub scrape: RateLimiter,
    pub transcription: RateLimiter,
}

impl Limiters {
    pub fn from_config(limits: &LimitsConfig) -> Self {
        let build = |name: &str, rps: f64| {
            RateLimiter::per_second(name, rps)
                .with_safety_buffer(Duration::from_millis(limits.safety_buffer_ms))
                .with_operation_timeout(limits.operation_timeout())
        };

        Self {
            scrape: build("scrape-api", limits.scrape_requests_per_second),
            transcription: build("transcription", limits.transcription_requests_per_second),
        }
    }
}

/// Retry `operation`, sending every attempt through `limiter`.
///
/// Backoff sleeps happen outside the queue, so a failing caller does not hold the provider
/// slot while it waits; each attempt is paced like any other request.
pub async fn paced_retry<F, Fut, T>(limiter: &RateLimiter, retrier: &Retrier, key: &str, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    T: Send + 'static,
{
    retrier
        .retry(
            || {
                let attempt = operation();
                limiter.enqueue(move || attempt, key)
            },
            key,
        )
        .await
}
