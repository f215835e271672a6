use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

pub mod fallback;
pub mod media;
pub mod orchestrator;
pub mod service;

pub use fallback::{degraded_reason, is_degraded, FallbackStrategy, FallbackTable, DEGRADED_SENTINELS};
pub use media::{MediaFile, MediaPolicy};
pub use orchestrator::TranscriptionOrchestrator;
pub use service::HttpTranscriptionService;

use crate::platform::Platform;
use crate::Result;

/// Which path produced a transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Primary,
    Fallback,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Primary => f.write_str("primary"),
            Method::Fallback => f.write_str("fallback"),
        }
    }
}

/// Structured pieces of a short-form script, when the primary service extracts them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptComponents {
    #[serde(default)]
    pub hook: Option<String>,
    #[serde(default)]
    pub bridge: Option<String>,
    #[serde(default, alias = "goldenNugget")]
    pub golden_nugget: Option<String>,
    #[serde(default, alias = "callToAction", alias = "wta")]
    pub call_to_action: Option<String>,
}

/// Raw answer from the primary transcription service
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimaryTranscript {
    pub transcript: String,
    #[serde(default)]
    pub components: Option<ScriptComponents>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl PrimaryTranscript {
    pub fn new(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            ..Default::default()
        }
    }
}

/// Primary transcription service (file upload or remote URL).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptionService: Send + Sync {
    async fn transcribe_url(&self, url: &str, platform: Platform) -> Result<PrimaryTranscript>;

    async fn transcribe_file(&self, file: &MediaFile) -> Result<PrimaryTranscript>;
}

/// What to transcribe
#[derive(Debug, Clone)]
pub enum TranscriptionSource {
    Url(String),
    File(MediaFile),
}

impl TranscriptionSource {
    /// URL, or file name for uploads
    pub fn label(&self) -> &str {
        match self {
            TranscriptionSource::Url(url) => url,
            TranscriptionSource::File(file) => &file.file_name,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub source: TranscriptionSource,
    /// Skips detection when set
    pub platform_hint: Option<Platform>,
}

impl TranscriptionRequest {
    pub fn url(url: impl Into<String>) -> Self {
        Self {
            source: TranscriptionSource::Url(url.into()),
            platform_hint: None,
        }
    }

    pub fn file(file: MediaFile) -> Self {
        Self {
            source: TranscriptionSource::File(file),
            platform_hint: None,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform_hint = Some(platform);
        self
    }
}

/// One attempt's result, used only to decide whether to escalate
#[derive(Debug, Clone)]
pub struct TranscriptionAttemptResult {
    pub transcript: String,
    pub method: Method,
    pub degraded: bool,
    pub components: Option<ScriptComponents>,
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeMetadata {
    /// URL or file name
    pub source: String,
    pub requested_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    /// False when best-effort persistence failed
    pub persisted: bool,
    /// Extra fields reported by the primary service
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub service: BTreeMap<String, Value>,
}

/// Caller-facing success shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionOutcome {
    pub transcript: String,
    pub platform: Platform,
    pub method: Method,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<ScriptComponents>,
    pub metadata: OutcomeMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// Envelope produced at the orchestrator's outer boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<TranscriptionOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl TranscriptionResponse {
    pub fn success(outcome: TranscriptionOutcome) -> Self {
        Self {
            success: true,
            data: Some(outcome),
            error: None,
        }
    }

    pub fn failure(error: &anyhow::Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ErrorBody {
                kind: error_kind(error).to_string(),
                message: format!("{:#}", error),
            }),
        }
    }
}

/// Stable, machine-readable name for a failure
pub fn error_kind(error: &anyhow::Error) -> &'static str {
    use crate::ScribeError;

    match error.chain().find_map(|e| e.downcast_ref::<ScribeError>()) {
        Some(ScribeError::Unsupported(_)) => "unsupported_input",
        Some(ScribeError::InvalidInput(_)) => "invalid_input",
        Some(ScribeError::Permanent(_)) => "upstream_permanent",
        Some(ScribeError::RateLimited(_)) => "rate_limited",
        Some(ScribeError::Degraded(_)) => "degraded_result",
        Some(ScribeError::Timeout { .. }) => "timeout",
        Some(ScribeError::QueueCleared(_)) => "cancelled",
        Some(ScribeError::Config(_)) => "configuration",
        Some(ScribeError::Platform { cause, .. }) => match crate::queue::classify(cause) {
            crate::ErrorClass::Permanent => "upstream_permanent",
            crate::ErrorClass::RateLimited => "rate_limited",
            crate::ErrorClass::Transient => "upstream_transient",
        },
        _ => "upstream_transient",
    }
}
