use anyhow::Result;
use clap::Parser;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use reelscribe::output;
use reelscribe::platform::{ContentType, Platform, URL_SIGNATURES};
use reelscribe::transcribe::{FallbackTable, MediaFile, MediaPolicy, TranscriptionRequest};
use reelscribe::{Cli, Commands, Config, Limiters, OutputFormat, PlatformDetector, TranscriptionOrchestrator, UnifiedVideoScraper};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    match cli.command {
        Commands::Transcribe {
            input,
            platform,
            format,
            output,
        } => {
            let config = Config::load().await?.with_api_keys(cli.scrape_api_key, cli.transcribe_api_key);
            let limiters = Limiters::from_config(&config.limits);
            let orchestrator = TranscriptionOrchestrator::from_config(&config, &limiters)?;

            let policy = MediaPolicy::from_config(&config.transcription);
            let request = build_request(&input, platform, &policy).await?;

            let progress = spinner(cli.quiet, "Transcribing...")?;
            let response = orchestrator.respond(request).await;
            progress.finish_and_clear();

            match (&response.data, &format) {
                (Some(outcome), _) => {
                    let content = output::render_outcome(outcome, &format)?;
                    emit(&content, output.as_deref(), "Transcription").await?;
                }
                (None, OutputFormat::Json) => {
                    output::print_to_console(&serde_json::to_string_pretty(&response)?);
                    std::process::exit(1);
                }
                (None, OutputFormat::Text) => {
                    let message = response
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "unknown error".to_string());
                    anyhow::bail!("Transcription failed: {}", message);
                }
            }
        }
        Commands::Scrape { url, format, output } => {
            let config = Config::load().await?.with_api_keys(cli.scrape_api_key, cli.transcribe_api_key);
            let limiters = Limiters::from_config(&config.limits);
            let scraper = UnifiedVideoScraper::from_config(&config, limiters.scrape.clone())?;

            let progress = spinner(cli.quiet, "Scraping...")?;
            let result = scraper.scrape_url(&url).await;
            progress.finish_and_clear();

            let content = output::render_scrape(&result?, &format)?;
            emit(&content, output.as_deref(), "Scrape result").await?;
        }
        Commands::Detect { input, format } => {
            let detection = PlatformDetector::new().detect(&input);
            output::print_to_console(&output::render_detection(&input, &detection, &format)?);
        }
        Commands::Config { show } => {
            let config = Config::load().await?;
            if show {
                config.display();
            } else {
                println!("Configuration file: {}", Config::config_path()?.display());
                println!("Run with --show to print the current settings.");
            }
        }
        Commands::Platforms => print_platforms(),
    }

    Ok(())
}

fn init_tracing(cli: &Cli) {
    let default_filter = if cli.verbose { "reelscribe=debug" } else { "reelscribe=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

/// Treat existing paths as uploads, everything else as a URL
async fn build_request(input: &str, platform: Option<Platform>, policy: &MediaPolicy) -> Result<TranscriptionRequest> {
    let path = PathBuf::from(input);
    let request = if path.is_file() {
        TranscriptionRequest::file(MediaFile::from_path(&path, policy).await?)
    } else {
        TranscriptionRequest::url(input)
    };

    Ok(match platform {
        Some(platform) => request.with_platform(platform),
        None => request,
    })
}

fn spinner(quiet: bool, message: &'static str) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }

    let progress = ProgressBar::new_spinner();
    progress.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    progress.set_message(message);
    progress.enable_steady_tick(Duration::from_millis(120));
    Ok(progress)
}

async fn emit(content: &str, path: Option<&Path>, what: &str) -> Result<()> {
    match path {
        Some(path) => {
            output::save_to_file(content, path).await?;
            println!("{} saved to: {}", what, path.display());
        }
        None => output::print_to_console(content),
    }
    Ok(())
}

fn print_platforms() {
    let fallbacks = FallbackTable::default();

    println!("{}", style("Supported platforms:").bold());
    for (platform, strategy) in fallbacks.entries() {
        println!("  • {} (fallback: {})", style(platform.display_name()).cyan(), strategy);
        let listed = URL_SIGNATURES
            .iter()
            .filter(|s| s.platform == platform && s.content_type != ContentType::Unknown);
        for signature in listed {
            let kind = if signature.short_link {
                format!("{}, short link", signature.content_type)
            } else {
                signature.content_type.to_string()
            };
            println!("      {} {}", style(format!("[{}]", kind)).dim(), signature.pattern);
        }
    }
    println!();
    println!("Local media files are accepted by `transcribe` when the file name mentions the");
    println!("platform (e.g. tiktok_clip.mp4) or --platform is given.");
}
