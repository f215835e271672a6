//! ReelScribe - paced, retrying fetch and transcription of short-form video content
//!
//! This library wraps flaky, rate-limited third-party APIs (a keyed scraping API and a
//! generative transcription service) behind a single-flight request queue, an
//! exponential-backoff retrier, a pure platform detector and a transcription
//! orchestrator that falls back to scraped text when the primary service degrades.

pub mod cli;
pub mod config;
pub mod output;
pub mod platform;
pub mod queue;
pub mod scraper;
pub mod store;
pub mod transcribe;
pub mod utils;

pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use platform::{ContentType, Detection, Platform, PlatformDetector};
pub use queue::{Limiters, RateLimiter, Retrier};
pub use scraper::{UnifiedVideoResult, UnifiedVideoScraper};
pub use transcribe::{TranscriptionOrchestrator, TranscriptionOutcome, TranscriptionResponse};

/// Result type used throughout the library
pub type Result<T> = anyhow::Result<T>;

/// How a failure should be treated by the retrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Never retried (not found, unauthorized, forbidden, unsupported input)
    Permanent,
    /// Retried with the longer rate-limit backoff curve
    RateLimited,
    /// Retried with the standard backoff curve
    Transient,
}

/// Error types specific to ReelScribe
#[derive(thiserror::Error, Debug)]
pub enum ScribeError {
    #[error("Permanent upstream failure: {0}")]
    Permanent(String),

    #[error("Transient upstream failure: {0}")]
    Transient(String),

    #[error("Rate limited by upstream: {0}")]
    RateLimited(String),

    #[error("Unsupported input: {0}")]
    Unsupported(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Degraded result: {0}")]
    Degraded(String),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Queue cleared before operation '{0}' started")]
    QueueCleared(String),

    #[error("Operation '{key}' timed out after {seconds}s")]
    Timeout { key: String, seconds: u64 },

    #[error("Operation '{0}' aborted before settling")]
    OperationAborted(String),

    #[error("Operation '{0}' failed after exhausting retries")]
    RetriesExhausted(String),

    #[error("{platform} scrape failed: {cause:#}")]
    Platform {
        platform: Platform,
        cause: anyhow::Error,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ScribeError {
    /// Structured classification used by the retrier before any message sniffing
    pub fn classification(&self) -> ErrorClass {
        match self {
            ScribeError::Permanent(_)
            | ScribeError::Unsupported(_)
            | ScribeError::InvalidInput(_)
            | ScribeError::QueueCleared(_)
            | ScribeError::Config(_) => ErrorClass::Permanent,
            ScribeError::RateLimited(_) => ErrorClass::RateLimited,
            ScribeError::Platform { cause, .. } => queue::classify(cause),
            ScribeError::Transient(_)
            | ScribeError::Degraded(_)
            | ScribeError::Persistence(_)
            | ScribeError::Timeout { .. }
            | ScribeError::OperationAborted(_)
            | ScribeError::RetriesExhausted(_) => ErrorClass::Transient,
        }
    }
}
