use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;

use super::{
    degraded_reason, FallbackStrategy, FallbackTable, MediaFile, MediaPolicy, Method, OutcomeMetadata,
    PrimaryTranscript, TranscriptionAttemptResult, TranscriptionRequest, TranscriptionResponse,
    TranscriptionOutcome, TranscriptionService, TranscriptionSource,
};
use crate::config::Config;
use crate::platform::{ContentType, Platform, PlatformDetector};
use crate::queue::{paced_retry, Limiters, RateLimiter, Retrier};
use crate::scraper::UnifiedVideoScraper;
use crate::store::{JsonlTranscriptStore, NullStore, TranscriptRecord, TranscriptStore};
use crate::utils::is_blank;
use crate::{Result, ScribeError};

use super::service::HttpTranscriptionService;

/// Primary transcription with a per-platform scraped-text fallback.
///
/// Callers see exactly one transcript (tagged with the method that produced it) or one
/// terminal error. Intermediate failures are only logged.
pub struct TranscriptionOrchestrator {
    primary: Arc<dyn TranscriptionService>,
    scraper: Arc<UnifiedVideoScraper>,
    store: Arc<dyn TranscriptStore>,
    limiter: RateLimiter,
    retrier: Retrier,
    detector: PlatformDetector,
    fallbacks: FallbackTable,
    media_policy: MediaPolicy,
}

/// Platform and, for remote content, the canonical URL
struct Target {
    platform: Platform,
    url: Option<String>,
}

impl TranscriptionOrchestrator {
    /// `limiter` paces calls to the primary service and must be shared with any other caller of it
    pub fn new(
        primary: Arc<dyn TranscriptionService>,
        scraper: Arc<UnifiedVideoScraper>,
        store: Arc<dyn TranscriptStore>,
        limiter: RateLimiter,
        retrier: Retrier,
    ) -> Self {
        Self {
            primary,
            scraper,
            store,
            limiter,
            retrier,
            detector: PlatformDetector::new(),
            fallbacks: FallbackTable::default(),
            media_policy: MediaPolicy::default(),
        }
    }

    /// Wire up the HTTP collaborators described by `config`
    pub fn from_config(config: &Config, limiters: &Limiters) -> Result<Self> {
        let retrier = Retrier::new(config.limits.max_retries, config.limits.base_delay());
        let primary = HttpTranscriptionService::new(&config.transcription)?;
        let scraper = UnifiedVideoScraper::from_config(config, limiters.scrape.clone())?;

        let store: Arc<dyn TranscriptStore> = match &config.app.history_file {
            Some(path) => Arc::new(JsonlTranscriptStore::new(path)),
            None => Arc::new(NullStore),
        };

        Ok(Self::new(
            Arc::new(primary),
            Arc::new(scraper),
            store,
            limiters.transcription.clone(),
            retrier,
        )
        .with_media_policy(MediaPolicy::from_config(&config.transcription)))
    }

    pub fn with_fallbacks(mut self, fallbacks: FallbackTable) -> Self {
        self.fallbacks = fallbacks;
        self
    }

    pub fn with_media_policy(mut self, media_policy: MediaPolicy) -> Self {
        self.media_policy = media_policy;
        self
    }

    pub fn fallbacks(&self) -> &FallbackTable {
        &self.fallbacks
    }

    /// Outer boundary: never fails, converts errors into the failure envelope
    pub async fn respond(&self, request: TranscriptionRequest) -> TranscriptionResponse {
        match self.transcribe(request).await {
            Ok(outcome) => TranscriptionResponse::success(outcome),
            Err(e) => {
                tracing::error!(error = %format!("{:#}", e), "Transcription failed");
                TranscriptionResponse::failure(&e)
            }
        }
    }

    pub async fn transcribe(&self, request: TranscriptionRequest) -> Result<TranscriptionOutcome> {
        let requested_at = Utc::now();
        let started = Instant::now();
        let target = self.determine_target(&request)?;
        let source_label = target
            .url
            .clone()
            .unwrap_or_else(|| request.source.label().to_string());
        tracing::info!(platform = %target.platform, source = %source_label, "Transcription requested");

        if let TranscriptionSource::File(file) = &request.source {
            self.media_policy.validate(file)?;
        }

        let primary_failure = match self.attempt_primary(&request.source, &target).await {
            Ok(attempt) if !attempt.degraded => {
                return Ok(self.finish(attempt, target.platform, source_label, requested_at, started).await);
            }
            Ok(attempt) => {
                let reason = degraded_reason(&attempt.transcript, &attempt.metadata)
                    .unwrap_or_else(|| "degraded result".to_string());
                tracing::warn!(platform = %target.platform, reason = %reason, "Primary transcript degraded");
                anyhow::Error::from(ScribeError::Degraded(reason))
            }
            Err(e) => {
                tracing::warn!(platform = %target.platform, error = %format!("{:#}", e), "Primary transcription failed");
                e
            }
        };

        let attempt = self.attempt_fallback(&target, primary_failure).await?;
        Ok(self.finish(attempt, target.platform, source_label, requested_at, started).await)
    }

    fn determine_target(&self, request: &TranscriptionRequest) -> Result<Target> {
        match &request.source {
            TranscriptionSource::Url(raw) => {
                let detection = self.detector.detect(raw);
                let platform = request.platform_hint.unwrap_or(detection.platform);

                if !platform.is_supported() {
                    return Err(ScribeError::Unsupported(format!("no platform recognised for '{}'", raw)).into());
                }
                if detection.is_supported() && detection.content_type != ContentType::Video {
                    return Err(ScribeError::Unsupported(format!(
                        "'{}' is a {} URL, expected a single video or post",
                        raw, detection.content_type
                    ))
                    .into());
                }
                let url = detection
                    .normalized
                    .ok_or_else(|| ScribeError::Unsupported(format!("'{}' is not a URL", raw)))?;

                Ok(Target {
                    platform,
                    url: Some(url),
                })
            }
            TranscriptionSource::File(file) => {
                let platform = request
                    .platform_hint
                    .unwrap_or_else(|| self.detector.detect_file(&file.file_name).platform);

                if !platform.is_supported() {
                    return Err(ScribeError::Unsupported(format!(
                        "cannot tell which platform '{}' came from, pass a platform explicitly",
                        file.file_name
                    ))
                    .into());
                }
                Ok(Target { platform, url: None })
            }
        }
    }

    async fn attempt_primary(
        &self,
        source: &TranscriptionSource,
        target: &Target,
    ) -> Result<TranscriptionAttemptResult> {
        let primary = Arc::clone(&self.primary);
        let platform = target.platform;

        let response: PrimaryTranscript = match (source, &target.url) {
            (TranscriptionSource::File(file), _) => {
                let file: Arc<MediaFile> = Arc::new(file.clone());
                let key = format!("transcribe:{}:{}", platform.as_str(), file.file_name);
                paced_retry(&self.limiter, &self.retrier, &key, move || {
                    let primary = Arc::clone(&primary);
                    let file = Arc::clone(&file);
                    async move { primary.transcribe_file(&file).await }
                })
                .await?
            }
            (TranscriptionSource::Url(_), Some(url)) => {
                let key = format!("transcribe:{}:{}", platform.as_str(), url);
                let url = url.clone();
                paced_retry(&self.limiter, &self.retrier, &key, move || {
                    let primary = Arc::clone(&primary);
                    let url = url.clone();
                    async move { primary.transcribe_url(&url, platform).await }
                })
                .await?
            }
            (TranscriptionSource::Url(raw), None) => {
                return Err(ScribeError::Unsupported(format!("'{}' is not a URL", raw)).into());
            }
        };

        let degraded = degraded_reason(&response.transcript, &response.metadata).is_some();
        Ok(TranscriptionAttemptResult {
            transcript: response.transcript,
            method: Method::Primary,
            degraded,
            components: response.components,
            metadata: response.metadata,
        })
    }

    /// Second and last chance. Returns the primary failure when no fallback applies.
    async fn attempt_fallback(
        &self,
        target: &Target,
        primary_failure: anyhow::Error,
    ) -> Result<TranscriptionAttemptResult> {
        let strategy = self.fallbacks.strategy_for(target.platform);

        let url = match (strategy, &target.url) {
            (FallbackStrategy::None, _) => {
                tracing::info!(platform = %target.platform, "No fallback defined for platform");
                return Err(primary_failure);
            }
            (FallbackStrategy::ScrapedText, None) => {
                tracing::info!(platform = %target.platform, "Scraped-text fallback needs a URL, skipping");
                return Err(primary_failure);
            }
            (FallbackStrategy::ScrapedText, Some(url)) => url,
        };

        tracing::info!(platform = %target.platform, strategy = %strategy, "Falling back");

        let text = self
            .scraper
            .fetch_transcript_text(url)
            .await
            .and_then(|text| {
                if is_blank(&text) {
                    Err(ScribeError::Degraded("scraped transcript is empty".into()).into())
                } else {
                    Ok(text)
                }
            })
            .map_err(|e| e.context(format!("Fallback failed after primary failure: {:#}", primary_failure)))?;

        Ok(TranscriptionAttemptResult {
            transcript: text,
            method: Method::Fallback,
            degraded: false,
            components: None,
            metadata: Default::default(),
        })
    }

    /// Build the outcome and persist it. Persistence failures only flip `persisted`.
    async fn finish(
        &self,
        attempt: TranscriptionAttemptResult,
        platform: Platform,
        source: String,
        requested_at: DateTime<Utc>,
        started: Instant,
    ) -> TranscriptionOutcome {
        let completed_at = Utc::now();

        let record = TranscriptRecord {
            id: Uuid::new_v4(),
            transcript: attempt.transcript.clone(),
            platform,
            method: attempt.method,
            source: source.clone(),
            requested_at,
            completed_at,
        };

        let persisted = match self.store.append(&record).await {
            Ok(()) => true,
            Err(e) => {
                let error = ScribeError::Persistence(format!("{:#}", e));
                tracing::warn!(error = %error, id = %record.id, "Transcript not persisted");
                false
            }
        };

        tracing::info!(
            platform = %platform,
            method = %attempt.method,
            chars = attempt.transcript.len(),
            "Transcription complete"
        );

        TranscriptionOutcome {
            transcript: attempt.transcript,
            platform,
            method: attempt.method,
            components: attempt.components,
            metadata: OutcomeMetadata {
                source,
                requested_at,
                completed_at,
                elapsed_ms: started.elapsed().as_millis() as u64,
                persisted,
                service: attempt.metadata,
            },
        }
    }
}
