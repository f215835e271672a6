use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::ScribeError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Keyed scraping API
    pub scrape_api: ScrapeApiConfig,

    /// Primary transcription service
    pub transcription: TranscriptionConfig,

    /// Pacing and retry constants
    pub limits: LimitsConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeApiConfig {
    /// Base URL, endpoints are appended per platform and content type
    pub base_url: String,

    /// API key sent with every request
    pub api_key: Option<String>,

    /// Header name carrying the API key
    pub api_key_header: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    /// Base URL of the transcription service
    pub endpoint: String,

    /// Bearer token for the transcription service
    pub api_key: Option<String>,

    /// Model name forwarded to the service
    pub model: String,

    /// Largest accepted upload
    pub max_file_size_mb: u64,

    /// Accepted upload extensions
    pub allowed_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    pub scrape_requests_per_second: f64,
    pub transcription_requests_per_second: f64,

    /// Pause after every queued operation
    pub safety_buffer_ms: u64,

    /// Per-operation timeout, 0 disables it
    pub operation_timeout_secs: u64,

    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl LimitsConfig {
    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_secs > 0).then(|| Duration::from_secs(self.operation_timeout_secs))
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            scrape_requests_per_second: 0.5,
            transcription_requests_per_second: 0.5,
            safety_buffer_ms: 100,
            operation_timeout_secs: 60,
            max_retries: 3,
            base_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// JSON-lines file receiving one record per successful transcript
    pub history_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scrape_api: ScrapeApiConfig {
                base_url: "https://api.scrapecreators.com".to_string(),
                api_key: None,
                api_key_header: "x-api-key".to_string(),
            },
            transcription: TranscriptionConfig {
                endpoint: "http://127.0.0.1:8787/v1".to_string(),
                api_key: None,
                model: "gemini-2.0-flash".to_string(),
                max_file_size_mb: 25,
                allowed_extensions: ["mp4", "mov", "webm", "m4v", "mp3", "m4a", "wav"]
                    .iter()
                    .map(|ext| ext.to_string())
                    .collect(),
            },
            limits: LimitsConfig::default(),
            app: AppConfig {
                history_file: dirs::data_dir().map(|dir| dir.join("reelscribe").join("history.jsonl")),
            },
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            let content = fs_err::read_to_string(&config_path)
                .context("Failed to read config file")?;

            Self::from_yaml(&content)
        } else {
            let config = Self::default();
            config.save().await?;
            Ok(config)
        }
    }

    /// Parse and validate a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(content)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;

        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(&config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("reelscribe").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (name, raw) in [
            ("scrape_api.base_url", &self.scrape_api.base_url),
            ("transcription.endpoint", &self.transcription.endpoint),
        ] {
            let parsed = Url::parse(raw)
                .map_err(|_| ScribeError::Config(format!("{} is not a valid URL: {}", name, raw)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ScribeError::Config(format!("{} must use HTTP or HTTPS", name)).into());
            }
        }

        for (name, rps) in [
            ("limits.scrape_requests_per_second", self.limits.scrape_requests_per_second),
            ("limits.transcription_requests_per_second", self.limits.transcription_requests_per_second),
        ] {
            if !(rps.is_finite() && rps > 0.0) {
                return Err(ScribeError::Config(format!("{} must be a positive number", name)).into());
            }
        }

        if self.transcription.max_file_size_mb == 0 {
            return Err(ScribeError::Config("transcription.max_file_size_mb must be at least 1".into()).into());
        }

        Ok(())
    }

    /// Fill API keys from command-line / environment overrides
    pub fn with_api_keys(mut self, scrape_api_key: Option<String>, transcribe_api_key: Option<String>) -> Self {
        if scrape_api_key.is_some() {
            self.scrape_api.api_key = scrape_api_key;
        }
        if transcribe_api_key.is_some() {
            self.transcription.api_key = transcribe_api_key;
        }
        self
    }

    /// Display current configuration
    pub fn display(&self) {
        let mask = |key: &Option<String>| if key.is_some() { "set" } else { "not set" };

        println!("Current Configuration:");
        println!("  Scrape API: {}", self.scrape_api.base_url);
        println!("  Scrape API Key: {}", mask(&self.scrape_api.api_key));
        println!("  Transcription Endpoint: {}", self.transcription.endpoint);
        println!("  Transcription API Key: {}", mask(&self.transcription.api_key));
        println!("  Transcription Model: {}", self.transcription.model);
        println!("  Max Upload: {} MB", self.transcription.max_file_size_mb);
        println!(
            "  Pacing: scrape {}/s, transcription {}/s (+{}ms buffer)",
            self.limits.scrape_requests_per_second,
            self.limits.transcription_requests_per_second,
            self.limits.safety_buffer_ms
        );
        println!(
            "  Retries: {} (base delay {}ms), timeout {}s",
            self.limits.max_retries, self.limits.base_delay_ms, self.limits.operation_timeout_secs
        );
        match &self.app.history_file {
            Some(path) => println!("  History File: {}", path.display()),
            None => println!("  History File: disabled"),
        }
    }
}
