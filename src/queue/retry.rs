use once_cell::sync::Lazy;
use regex::Regex;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::{ErrorClass, Result, ScribeError};

/// Ceiling for the rate-limit backoff curve (`base * 3^attempt`)
pub const RATE_LIMIT_DELAY_CAP: Duration = Duration::from_secs(30);

/// Ceiling for the standard backoff curve (`base * 2^attempt`)
pub const TRANSIENT_DELAY_CAP: Duration = Duration::from_secs(10);

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

const PERMANENT_MARKERS: &[&str] = &["not found", "unauthorized", "forbidden"];
const RATE_LIMIT_MARKERS: &[&str] = &["rate limit", "too many requests"];

/// A bare status code only counts next to `HTTP`, `status` or `code`, never inside a URL or id
static STATUS_CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:http(?:/[\d.]+)?|status(?:\s+code)?|code)[\s:=]+(\d{3})\b").expect("valid status regex")
});

/// Bookkeeping for one retried operation
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// Zero-based; only ever increases
    pub attempt: u32,
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Classification of the most recent failure
    pub classification: Option<ErrorClass>,
}

impl RetryContext {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            attempt: 0,
            max_retries,
            base_delay,
            classification: None,
        }
    }

    pub fn has_attempts_left(&self) -> bool {
        self.attempt < self.max_retries
    }

    /// Delay before the next attempt, given the current classification
    pub fn next_delay(&self) -> Duration {
        backoff_delay(
            self.classification.unwrap_or(ErrorClass::Transient),
            self.base_delay,
            self.attempt,
        )
    }
}

/// Classify a failure.
///
/// Typed [`ScribeError`]s anywhere in the chain win, then HTTP status codes carried by
/// `reqwest` errors. Message sniffing is only a fallback for untyped errors.
pub fn classify(error: &anyhow::Error) -> ErrorClass {
    if let Some(scribe) = error.chain().find_map(|e| e.downcast_ref::<ScribeError>()) {
        return scribe.classification();
    }

    // Status-less transport errors embed the request URL, whose digits mean nothing
    if let Some(http) = error.chain().find_map(|e| e.downcast_ref::<reqwest::Error>()) {
        return match http.status() {
            Some(status) => classify_status_code(status.as_u16()),
            None => ErrorClass::Transient,
        };
    }

    classify_message(&format!("{:#}", error))
}

/// Classification of a raw HTTP status code
pub fn classify_status_code(status: u16) -> ErrorClass {
    match status {
        401 | 403 | 404 => ErrorClass::Permanent,
        429 => ErrorClass::RateLimited,
        _ => ErrorClass::Transient,
    }
}

/// Substring classification for untyped legacy errors
pub fn classify_message(message: &str) -> ErrorClass {
    let lower = message.to_lowercase();

    let status = STATUS_CODE_RE
        .captures_iter(&lower)
        .filter_map(|caps| caps[1].parse::<u16>().ok())
        .map(classify_status_code)
        .find(|class| *class != ErrorClass::Transient);
    if let Some(class) = status {
        return class;
    }

    if PERMANENT_MARKERS.iter().any(|marker| lower.contains(marker)) {
        ErrorClass::Permanent
    } else if RATE_LIMIT_MARKERS.iter().any(|marker| lower.contains(marker)) {
        ErrorClass::RateLimited
    } else {
        ErrorClass::Transient
    }
}

/// Backoff before retry number `attempt + 1`
pub fn backoff_delay(class: ErrorClass, base_delay: Duration, attempt: u32) -> Duration {
    match class {
        ErrorClass::Permanent => Duration::ZERO,
        ErrorClass::RateLimited => base_delay
            .saturating_mul(3u32.saturating_pow(attempt))
            .min(RATE_LIMIT_DELAY_CAP),
        ErrorClass::Transient => base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(TRANSIENT_DELAY_CAP),
    }
}

/// Run `operation` up to `1 + max_retries` times.
///
/// Permanent failures return immediately. After the last attempt the last captured error is
/// returned unchanged.
pub async fn retry_with_backoff<F, Fut, T>(
    mut operation: F,
    max_retries: u32,
    base_delay: Duration,
    key: &str,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut ctx = RetryContext::new(max_retries, base_delay);

    let last_error = loop {
        let error = match operation().await {
            Ok(value) => {
                if ctx.attempt > 0 {
                    tracing::info!(key = %key, attempt = ctx.attempt + 1, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => error,
        };

        let class = classify(&error);
        ctx.classification = Some(class);

        if class == ErrorClass::Permanent {
            tracing::warn!(key = %key, error = %error, "Permanent failure, not retrying");
            return Err(error);
        }

        if !ctx.has_attempts_left() {
            tracing::warn!(key = %key, attempts = ctx.attempt + 1, error = %error, "Retries exhausted");
            break Some(error);
        }

        let delay = ctx.next_delay();
        tracing::warn!(
            key = %key,
            attempt = ctx.attempt + 1,
            max_retries = ctx.max_retries,
            delay_ms = delay.as_millis() as u64,
            class = ?class,
            error = %error,
            "Operation failed, retrying"
        );

        sleep(delay).await;
        ctx.attempt += 1;
    };

    Err(exhausted(last_error, key))
}

/// Final error once the loop ends. `None` should be unreachable: the loop always records the
/// failure that ended it.
fn exhausted(last_error: Option<anyhow::Error>, key: &str) -> anyhow::Error {
    last_error.unwrap_or_else(|| ScribeError::RetriesExhausted(key.to_string()).into())
}

/// Retry policy bound to construction-time constants
#[derive(Debug, Clone, Copy)]
pub struct Retrier {
    max_retries: u32,
    base_delay: Duration,
}

impl Retrier {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub async fn retry<F, Fut, T>(&self, operation: F, key: &str) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        retry_with_backoff(operation, self.max_retries, self.base_delay, key).await
    }
}

impl Default for Retrier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_BASE_DELAY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_forbidden_is_attempted_once() {
        let calls = Arc::new(Mutex::new(0u32));
        let start = Instant::now();

        let c = calls.clone();
        let result: Result<()> = retry_with_backoff(
            move || {
                let c = c.clone();
                async move {
                    *c.lock().unwrap() += 1;
                    Err(anyhow::anyhow!("403 Forbidden"))
                }
            },
            3,
            Duration::from_millis(500),
            "forbidden",
        )
        .await;

        assert_eq!(*calls.lock().unwrap(), 1);
        assert!(result.unwrap_err().to_string().contains("403 Forbidden"));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_then_success() {
        let base = Duration::from_millis(1000);
        let calls = Arc::new(Mutex::new(Vec::<Instant>::new()));

        let c = calls.clone();
        let result = retry_with_backoff(
            move || {
                let c = c.clone();
                async move {
                    let mut calls = c.lock().unwrap();
                    calls.push(Instant::now());
                    if calls.len() < 4 {
                        Err(anyhow::anyhow!("429 Too Many Requests"))
                    } else {
                        Ok("done")
                    }
                }
            },
            3,
            base,
            "rate-limited",
        )
        .await;

        assert_eq!(result.unwrap(), "done");
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 4);

        let gaps: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(gaps, vec![base, base * 3, base * 9]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_exhausts_and_returns_last_error() {
        let calls = Arc::new(Mutex::new(0u32));

        let c = calls.clone();
        let result: Result<()> = retry_with_backoff(
            move || {
                let c = c.clone();
                async move {
                    let mut n = c.lock().unwrap();
                    *n += 1;
                    Err(anyhow::anyhow!("connection reset #{}", *n))
                }
            },
            2,
            Duration::from_millis(10),
            "flaky",
        )
        .await;

        assert_eq!(*calls.lock().unwrap(), 3);
        assert_eq!(result.unwrap_err().to_string(), "connection reset #3");
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_runs_once() {
        let calls = Arc::new(Mutex::new(0u32));
        let c = calls.clone();
        let result: Result<()> = Retrier::new(0, Duration::from_secs(1))
            .retry(
                move || {
                    let c = c.clone();
                    async move {
                        *c.lock().unwrap() += 1;
                        Err(anyhow::anyhow!("503 Service Unavailable"))
                    }
                },
                "once",
            )
            .await;

        assert!(result.is_err());
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[test]
    fn test_exhausted_without_captured_error() {
        let error = exhausted(None, "ghost");
        assert!(matches!(
            error.downcast_ref::<ScribeError>(),
            Some(ScribeError::RetriesExhausted(key)) if key == "ghost"
        ));
    }

    #[test]
    fn test_exhausted_prefers_last_error() {
        let error = exhausted(Some(anyhow::anyhow!("last")), "key");
        assert_eq!(error.to_string(), "last");
    }

    #[test]
    fn test_rate_limit_backoff_increases_and_caps() {
        let base = Duration::from_secs(1);
        let delays: Vec<Duration> = (0..6)
            .map(|attempt| backoff_delay(ErrorClass::RateLimited, base, attempt))
            .collect();

        assert_eq!(delays[0], Duration::from_secs(1));
        assert_eq!(delays[1], Duration::from_secs(3));
        assert_eq!(delays[2], Duration::from_secs(9));
        assert_eq!(delays[3], Duration::from_secs(27));
        assert_eq!(delays[4], RATE_LIMIT_DELAY_CAP);
        assert_eq!(delays[5], RATE_LIMIT_DELAY_CAP);
        assert!(delays.windows(2).take(4).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_transient_backoff_caps_at_ten_seconds() {
        let base = Duration::from_secs(1);
        assert_eq!(backoff_delay(ErrorClass::Transient, base, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(ErrorClass::Transient, base, 3), Duration::from_secs(8));
        assert_eq!(backoff_delay(ErrorClass::Transient, base, 4), TRANSIENT_DELAY_CAP);
        assert_eq!(backoff_delay(ErrorClass::Transient, base, 40), TRANSIENT_DELAY_CAP);
    }

    #[test]
    fn test_classify_messages() {
        assert_eq!(classify_message("HTTP 404 Not Found"), ErrorClass::Permanent);
        assert_eq!(classify_message("Unauthorized: bad key"), ErrorClass::Permanent);
        assert_eq!(classify_message("rate limit exceeded"), ErrorClass::RateLimited);
        assert_eq!(classify_message("Too Many Requests"), ErrorClass::RateLimited);
        assert_eq!(classify_message("socket hang up"), ErrorClass::Transient);
        assert_eq!(classify_message("upstream status: 404"), ErrorClass::Permanent);
        assert_eq!(classify_message("request failed with status code 429"), ErrorClass::RateLimited);
        assert_eq!(classify_message("HTTP/1.1 401"), ErrorClass::Permanent);
        assert_eq!(classify_message("HTTP 502 Bad Gateway"), ErrorClass::Transient);
    }

    #[test]
    fn test_ids_in_urls_are_not_status_codes() {
        let refused = anyhow::anyhow!(
            "error sending request for url (https://api.example.com/v1/tiktok/video?url=https%3A%2F%2Fwww.tiktok.com%2F%40a%2Fvideo%2F7301404567890123456): Connection refused"
        );
        assert_eq!(classify(&refused), ErrorClass::Transient);

        let reset = anyhow::anyhow!("connection reset while fetching https://www.tiktok.com/@a/video/7301429000000000001")
            .context("fetching tiktok video");
        assert_eq!(classify(&reset), ErrorClass::Transient);

        assert_eq!(classify_message("timed out: https://cdn.example.com/401/403/clip.mp4"), ErrorClass::Transient);
    }

    #[tokio::test]
    async fn test_statusless_reqwest_error_is_transient() {
        // Nothing listens on port 9 locally; the error carries the URL but no status
        let url = "http://127.0.0.1:9/v1/tiktok/video/7301404567890429000";
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap();
        let err = client.get(url).send().await.unwrap_err();
        assert!(err.status().is_none());

        let wrapped = anyhow::Error::from(err).context("fetching tiktok video");
        assert_eq!(classify(&wrapped), ErrorClass::Transient);
    }

    #[test]
    fn test_classify_prefers_typed_errors() {
        // Message says 404 but the typed classification is rate-limited
        let typed: anyhow::Error = ScribeError::RateLimited("upstream said 404-ish".into()).into();
        assert_eq!(classify(&typed), ErrorClass::RateLimited);

        let unsupported: anyhow::Error = ScribeError::Unsupported("youtube".into()).into();
        assert_eq!(classify(&unsupported), ErrorClass::Permanent);

        let with_context = anyhow::Error::from(ScribeError::Permanent("gone".into())).context("fetching profile");
        assert_eq!(classify(&with_context), ErrorClass::Permanent);
    }

    #[test]
    fn test_classify_platform_wrapper_delegates() {
        let wrapped: anyhow::Error = ScribeError::Platform {
            platform: crate::Platform::TikTok,
            cause: anyhow::anyhow!("429 Too Many Requests"),
        }
        .into();
        assert_eq!(classify(&wrapped), ErrorClass::RateLimited);
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(classify_status_code(403), ErrorClass::Permanent);
        assert_eq!(classify_status_code(429), ErrorClass::RateLimited);
        assert_eq!(classify_status_code(502), ErrorClass::Transient);
    }
}
