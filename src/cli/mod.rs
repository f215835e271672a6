use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::platform::Platform;

#[derive(Parser)]
#[command(
    name = "reelscribe",
    about = "ReelScribe - Paced scraping and transcription of TikTok and Instagram videos",
    version,
    long_about = "Fetches short-form video metadata through a keyed scraping API and transcribes videos with a primary transcription service, falling back to platform-provided transcripts where available. All upstream calls are rate limited and retried with backoff."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Scrape API key (overrides the config file)
    #[arg(long, global = true, env = "REELSCRIBE_SCRAPE_API_KEY", hide_env_values = true)]
    pub scrape_api_key: Option<String>,

    /// Transcription service API key (overrides the config file)
    #[arg(long, global = true, env = "REELSCRIBE_TRANSCRIBE_API_KEY", hide_env_values = true)]
    pub transcribe_api_key: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transcribe a TikTok / Instagram URL or a local media file
    Transcribe {
        /// Video URL or path to a downloaded media file
        #[arg(value_name = "URL_OR_FILE")]
        input: String,

        /// Platform the content came from (required for files without a platform in their name)
        #[arg(short, long, value_name = "PLATFORM")]
        platform: Option<Platform>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Fetch normalized metadata for a single video or post
    Scrape {
        #[arg(value_name = "URL")]
        url: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Output file path (prints to console if not specified)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Classify a URL or file name without touching the network
    Detect {
        #[arg(value_name = "INPUT")]
        input: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Create or show the configuration file
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// List supported platforms, URL patterns and fallbacks
    Platforms,
}

#[derive(ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text
    Text,
    /// JSON
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}
