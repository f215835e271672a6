use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

pub mod http;
pub mod instagram;
pub mod tiktok;

pub use http::HttpScrapeApi;

use crate::config::Config;
use crate::platform::{ContentType, Platform, PlatformDetector};
use crate::queue::{paced_retry, RateLimiter, Retrier};
use crate::{Result, ScribeError};

/// Normalized record for a single piece of content, whatever platform it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedVideoResult {
    pub platform: Platform,

    /// Platform-specific unique id (TikTok numeric id, Instagram shortcode)
    pub canonical_id: String,

    /// Canonical URL the payload was fetched for
    pub source_url: String,

    /// Direct media URL, when the platform exposes one
    pub media_url: Option<String>,

    /// Caption / description text
    pub text: String,

    pub author: Author,

    pub metrics: VideoMetrics,

    pub duration_secs: Option<f64>,

    pub timestamps: Timestamps,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub username: Option<String>,
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoMetrics {
    pub views: Option<u64>,
    pub likes: Option<u64>,
    pub comments: Option<u64>,
    pub shares: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Timestamps {
    pub published_at: Option<DateTime<Utc>>,
    pub scraped_at: DateTime<Utc>,
}

/// Which upstream endpoint family a request targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Video,
    Transcript,
}

/// One call to the keyed scraping API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeRequest {
    pub platform: Platform,
    pub endpoint: Endpoint,
    pub url: String,
}

/// Upstream scraping API.
///
/// Implementations report failures as [`ScribeError`] variants where they can so the
/// retrier can classify them without reading messages.
#[async_trait]
pub trait ScrapeApi: Send + Sync {
    /// Fetch the raw JSON payload for one platform / endpoint
    async fn fetch(&self, request: &ScrapeRequest) -> Result<Value>;

    /// Follow redirects on a short link and return the final URL
    async fn resolve(&self, url: &str) -> Result<String>;
}

/// Content id plus the canonical URL it was read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContent {
    pub canonical_id: String,
    pub canonical_url: String,
}

/// Platform router: detect, resolve, fetch (paced and retried), map.
pub struct UnifiedVideoScraper {
    api: Arc<dyn ScrapeApi>,
    limiter: RateLimiter,
    retrier: Retrier,
    detector: PlatformDetector,
}

impl UnifiedVideoScraper {
    /// `limiter` must be the instance shared by everything hitting the same scrape API
    pub fn new(api: Arc<dyn ScrapeApi>, limiter: RateLimiter, retrier: Retrier) -> Self {
        Self {
            api,
            limiter,
            retrier,
            detector: PlatformDetector::new(),
        }
    }

    /// Scraper backed by the HTTP scrape API described in `config`
    pub fn from_config(config: &Config, limiter: RateLimiter) -> Result<Self> {
        let api = HttpScrapeApi::new(&config.scrape_api)?;
        let retrier = Retrier::new(config.limits.max_retries, config.limits.base_delay());
        Ok(Self::new(Arc::new(api), limiter, retrier))
    }

    /// Fetch and normalize a single video / reel / post
    pub async fn scrape_url(&self, url: &str) -> Result<UnifiedVideoResult> {
        let (platform, normalized) = self.detect_content(url)?;
        tracing::info!(platform = %platform, url = %normalized, "Scraping content");

        self.scrape_detected(platform, &normalized)
            .await
            .map_err(|cause| ScribeError::Platform { platform, cause }.into())
    }

    /// Fetch the platform-provided transcript text for a video.
    ///
    /// Blank text is returned as-is; deciding whether that counts as failure is up to the caller.
    pub async fn fetch_transcript_text(&self, url: &str) -> Result<String> {
        let (platform, normalized) = self.detect_content(url)?;
        tracing::info!(platform = %platform, url = %normalized, "Fetching scraped transcript");

        self.transcript_detected(platform, &normalized)
            .await
            .map_err(|cause| ScribeError::Platform { platform, cause }.into())
    }

    /// Fail fast, without touching the queue, on anything that is not single content
    fn detect_content(&self, url: &str) -> Result<(Platform, String)> {
        let detection = self.detector.detect(url);

        if !detection.is_supported() {
            return Err(ScribeError::Unsupported(format!("no scraper for '{}'", url)).into());
        }
        if detection.content_type != ContentType::Video {
            return Err(ScribeError::Unsupported(format!(
                "'{}' is a {} URL, expected a single video or post",
                url, detection.content_type
            ))
            .into());
        }
        let normalized = detection
            .normalized
            .ok_or_else(|| ScribeError::Unsupported(format!("'{}' is not a URL", url)))?;

        Ok((detection.platform, normalized))
    }

    async fn scrape_detected(&self, platform: Platform, url: &str) -> Result<UnifiedVideoResult> {
        let resolved = self.resolve(platform, url).await?;
        let raw = self.fetch_raw(platform, Endpoint::Video, &resolved).await?;
        map_payload(platform, &raw, &resolved, Utc::now())
    }

    async fn transcript_detected(&self, platform: Platform, url: &str) -> Result<String> {
        let resolved = self.resolve(platform, url).await?;
        let raw = self.fetch_raw(platform, Endpoint::Transcript, &resolved).await?;
        extract_transcript(platform, &raw)
    }

    /// Turn a (possibly short) URL into its canonical id and URL.
    ///
    /// Short links cost a network round trip to the same upstream, so they go through the
    /// shared limiter and retrier like any fetch.
    pub async fn resolve(&self, platform: Platform, url: &str) -> Result<ResolvedContent> {
        let canonical_url = if self.detector.is_short_link(url) {
            let api = Arc::clone(&self.api);
            let short = url.to_string();
            let key = format!("{}:resolve", platform.as_str());

            let target = paced_retry(&self.limiter, &self.retrier, &key, move || {
                let api = Arc::clone(&api);
                let short = short.clone();
                async move { api.resolve(&short).await }
            })
            .await?;

            tracing::debug!(short = %url, resolved = %target, "Resolved short link");
            crate::platform::normalize_url(&target).unwrap_or(target)
        } else {
            url.to_string()
        };

        let canonical_id = self
            .detector
            .extract_content_id(platform, &canonical_url)
            .ok_or_else(|| {
                ScribeError::Permanent(format!("could not find a content id in '{}'", canonical_url))
            })?;

        Ok(ResolvedContent {
            canonical_id,
            canonical_url,
        })
    }

    async fn fetch_raw(&self, platform: Platform, endpoint: Endpoint, resolved: &ResolvedContent) -> Result<Value> {
        let api = Arc::clone(&self.api);
        let request = ScrapeRequest {
            platform,
            endpoint,
            url: resolved.canonical_url.clone(),
        };
        let key = format!("{}:{:?}:{}", platform.as_str(), endpoint, resolved.canonical_id).to_lowercase();

        paced_retry(&self.limiter, &self.retrier, &key, move || {
            let api = Arc::clone(&api);
            let request = request.clone();
            async move { api.fetch(&request).await }
        })
        .await
    }
}

/// Route a raw payload to its platform mapper
pub fn map_payload(
    platform: Platform,
    raw: &Value,
    resolved: &ResolvedContent,
    scraped_at: DateTime<Utc>,
) -> Result<UnifiedVideoResult> {
    match platform {
        Platform::TikTok => tiktok::map_video(raw, resolved, scraped_at),
        Platform::Instagram => instagram::map_post(raw, resolved, scraped_at),
        Platform::Unsupported => Err(ScribeError::Unsupported("no mapper for unsupported platform".into()).into()),
    }
}

/// Route a raw transcript payload to its platform extractor
pub fn extract_transcript(platform: Platform, raw: &Value) -> Result<String> {
    match platform {
        Platform::TikTok => tiktok::extract_transcript(raw),
        other => Err(ScribeError::Unsupported(format!("{} has no scraped transcript source", other)).into()),
    }
}

/// Numbers arrive as JSON numbers or numeric strings depending on the endpoint
pub(crate) fn as_u64(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

pub(crate) fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    as_u64(value).and_then(|secs| DateTime::<Utc>::from_timestamp(secs as i64, 0))
}

pub(crate) fn non_empty(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use crate::queue::classify;
    use crate::ErrorClass;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::Instant;

    /// Scripted scrape API that records every call
    #[derive(Default)]
    pub struct FakeScrapeApi {
        pub fetch_responses: Mutex<Vec<Result<Value>>>,
        /// Consumed first; `resolve_target` answers once these run out
        pub resolve_responses: Mutex<Vec<Result<String>>>,
        pub resolve_target: Option<String>,
        pub fetches: Mutex<Vec<ScrapeRequest>>,
        pub resolves: Mutex<Vec<String>>,
        pub started: Mutex<Vec<(&'static str, Instant)>>,
    }

    impl FakeScrapeApi {
        pub fn with_responses(responses: Vec<Result<Value>>) -> Self {
            Self {
                fetch_responses: Mutex::new(responses),
                ..Default::default()
            }
        }

        pub fn fetch_count(&self) -> usize {
            self.fetches.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ScrapeApi for FakeScrapeApi {
        async fn fetch(&self, request: &ScrapeRequest) -> Result<Value> {
            self.started.lock().unwrap().push(("fetch", Instant::now()));
            self.fetches.lock().unwrap().push(request.clone());
            let mut responses = self.fetch_responses.lock().unwrap();
            if responses.is_empty() {
                anyhow::bail!("no scripted response");
            }
            responses.remove(0)
        }

        async fn resolve(&self, url: &str) -> Result<String> {
            self.started.lock().unwrap().push(("resolve", Instant::now()));
            self.resolves.lock().unwrap().push(url.to_string());
            let mut scripted = self.resolve_responses.lock().unwrap();
            if !scripted.is_empty() {
                return scripted.remove(0);
            }
            self.resolve_target
                .clone()
                .ok_or_else(|| anyhow::anyhow!("no redirect target"))
        }
    }

    pub fn scraper_with(api: Arc<FakeScrapeApi>) -> UnifiedVideoScraper {
        UnifiedVideoScraper::new(
            api,
            RateLimiter::new("scrape-test", Duration::from_millis(10)),
            Retrier::new(2, Duration::from_millis(10)),
        )
    }

    pub fn tiktok_payload() -> Value {
        json!({
            "aweme_detail": {
                "aweme_id": "7301234567890123456",
                "desc": "three hooks that always work",
                "create_time": 1700000000,
                "author": { "unique_id": "creator", "nickname": "The Creator" },
                "statistics": { "play_count": 1200, "digg_count": 300, "comment_count": 12, "share_count": 4 },
                "video": { "duration": 15000, "play_addr": { "url_list": ["https://cdn.example/v.mp4"] } }
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_unsupported_fails_fast_without_calls() {
        let api = Arc::new(FakeScrapeApi::default());
        let scraper = scraper_with(api.clone());

        let err = scraper.scrape_url("https://youtube.com/watch?v=1").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<ScribeError>(), Some(ScribeError::Unsupported(_))));
        assert_eq!(api.fetch_count(), 0);
        assert!(api.resolves.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_profile_url_is_rejected() {
        let api = Arc::new(FakeScrapeApi::default());
        let scraper = scraper_with(api.clone());

        let err = scraper.scrape_url("https://www.tiktok.com/@creator").await.unwrap_err();
        assert!(err.to_string().contains("profile"));
        assert_eq!(api.fetch_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_link_is_resolved_then_fetched() {
        let api = Arc::new(FakeScrapeApi {
            resolve_target: Some("https://www.tiktok.com/@creator/video/7301234567890123456?is_from_webapp=1".into()),
            ..FakeScrapeApi::with_responses(vec![Ok(tiktok_payload())])
        });
        let scraper = scraper_with(api.clone());

        let result = scraper.scrape_url("https://vm.tiktok.com/ZMN123ABC/").await.unwrap();

        assert_eq!(result.platform, Platform::TikTok);
        assert_eq!(result.canonical_id, "7301234567890123456");
        assert_eq!(result.author.username.as_deref(), Some("creator"));
        assert_eq!(api.resolves.lock().unwrap().as_slice(), ["https://vm.tiktok.com/ZMN123ABC/"]);

        let fetches = api.fetches.lock().unwrap();
        assert_eq!(fetches.len(), 1);
        assert_eq!(fetches[0].endpoint, Endpoint::Video);
        assert_eq!(fetches[0].url, "https://www.tiktok.com/@creator/video/7301234567890123456");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_resolve_failure_is_retried() {
        let api = Arc::new(FakeScrapeApi {
            resolve_responses: Mutex::new(vec![
                Err(anyhow::anyhow!("connection reset by peer")),
                Ok("https://www.tiktok.com/@creator/video/7301234567890123456".into()),
            ]),
            ..FakeScrapeApi::with_responses(vec![Ok(tiktok_payload())])
        });
        let scraper = scraper_with(api.clone());

        let result = scraper.scrape_url("https://vm.tiktok.com/ZMN123ABC/").await.unwrap();

        assert_eq!(result.canonical_id, "7301234567890123456");
        assert_eq!(api.resolves.lock().unwrap().len(), 2);
        assert_eq!(api.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forbidden_resolve_is_attempted_once() {
        let api = Arc::new(FakeScrapeApi {
            resolve_responses: Mutex::new(vec![Err(anyhow::anyhow!("403 Forbidden"))]),
            ..FakeScrapeApi::default()
        });
        let scraper = scraper_with(api.clone());
        let start = Instant::now();

        let err = scraper.scrape_url("https://vm.tiktok.com/ZMN123ABC/").await.unwrap_err();

        match err.downcast_ref::<ScribeError>() {
            Some(ScribeError::Platform { platform, .. }) => assert_eq!(*platform, Platform::TikTok),
            other => panic!("expected platform wrapper, got {:?}", other),
        }
        assert_eq!(classify(&err), ErrorClass::Permanent);
        assert_eq!(api.resolves.lock().unwrap().len(), 1);
        assert_eq!(api.fetch_count(), 0);
        assert!(start.elapsed() < Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_and_fetch_are_paced_by_the_same_limiter() {
        let api = Arc::new(FakeScrapeApi {
            resolve_target: Some("https://www.tiktok.com/@creator/video/7301234567890123456".into()),
            ..FakeScrapeApi::with_responses(vec![Ok(tiktok_payload())])
        });
        let scraper = scraper_with(api.clone());

        scraper.scrape_url("https://vm.tiktok.com/ZMN123ABC/").await.unwrap();

        let started = api.started.lock().unwrap();
        let kinds: Vec<&str> = started.iter().map(|(kind, _)| *kind).collect();
        assert_eq!(kinds, ["resolve", "fetch"]);
        assert!(started[1].1 - started[0].1 >= Duration::from_millis(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_fetch_failure_is_retried() {
        let api = Arc::new(FakeScrapeApi::with_responses(vec![
            Err(ScribeError::Transient("503".into()).into()),
            Ok(tiktok_payload()),
        ]));
        let scraper = scraper_with(api.clone());

        let result = scraper
            .scrape_url("https://www.tiktok.com/@creator/video/7301234567890123456")
            .await
            .unwrap();
        assert_eq!(result.metrics.views, Some(1200));
        assert_eq!(api.fetch_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_wrapped_with_platform_context() {
        let api = Arc::new(FakeScrapeApi::with_responses(vec![Err(
            ScribeError::Permanent("scrape api returned HTTP 404".into()).into(),
        )]));
        let scraper = scraper_with(api.clone());

        let err = scraper
            .scrape_url("https://www.instagram.com/reel/Cx1AbC-9z/")
            .await
            .unwrap_err();

        match err.downcast_ref::<ScribeError>() {
            Some(ScribeError::Platform { platform, .. }) => assert_eq!(*platform, Platform::Instagram),
            other => panic!("expected platform wrapper, got {:?}", other),
        }
        assert!(err.to_string().contains("Instagram"));
        assert_eq!(api.fetch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mapping_failure_is_surfaced() {
        let api = Arc::new(FakeScrapeApi::with_responses(vec![Ok(json!({ "unexpected": true }))]));
        let scraper = scraper_with(api);

        let err = scraper
            .scrape_url("https://www.tiktok.com/@creator/video/7301234567890123456")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("TikTok"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_transcript_text() {
        let api = Arc::new(FakeScrapeApi::with_responses(vec![Ok(json!({
            "transcript": "WEBVTT\n\n00:00:00.000 --> 00:00:02.000\nhello there\n"
        }))]));
        let scraper = scraper_with(api.clone());

        let text = scraper
            .fetch_transcript_text("https://www.tiktok.com/@creator/video/7301234567890123456")
            .await
            .unwrap();
        assert_eq!(text, "hello there");
        assert_eq!(api.fetches.lock().unwrap()[0].endpoint, Endpoint::Transcript);
    }

    #[test]
    fn test_as_u64_variants() {
        assert_eq!(as_u64(&json!(5)), Some(5));
        assert_eq!(as_u64(&json!("42")), Some(42));
        assert_eq!(as_u64(&json!(3.0)), Some(3));
        assert_eq!(as_u64(&json!(null)), None);
    }
}
