use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use crate::cli::OutputFormat;
use crate::platform::Detection;
use crate::scraper::UnifiedVideoResult;
use crate::transcribe::{ScriptComponents, TranscriptionOutcome, TranscriptionResponse};
use crate::utils::format_elapsed;

/// Render a transcription outcome
pub fn render_outcome(outcome: &TranscriptionOutcome, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(outcome_as_text(outcome)),
        OutputFormat::Json => to_json(&TranscriptionResponse::success(outcome.clone())),
    }
}

/// Render a scraped video record
pub fn render_scrape(result: &UnifiedVideoResult, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(scrape_as_text(result)),
        OutputFormat::Json => to_json(result),
    }
}

/// Render a detection result
pub fn render_detection(input: &str, detection: &Detection, format: &OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => {
            let mut out = format!(
                "Input: {}\nPlatform: {}\nContent: {}",
                input,
                detection.platform.display_name(),
                detection.content_type
            );
            if let Some(normalized) = &detection.normalized {
                out.push_str(&format!("\nNormalized: {}", normalized));
            }
            Ok(out)
        }
        OutputFormat::Json => to_json(detection),
    }
}

/// Write rendered content to a file
pub async fn save_to_file(content: &str, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs_err::create_dir_all(parent)?;
    }
    fs_err::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

/// Print rendered content to stdout
pub fn print_to_console(content: &str) {
    println!("{}", content);
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize output")
}

fn outcome_as_text(outcome: &TranscriptionOutcome) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "# {} transcript ({})\n",
        outcome.platform.display_name(),
        outcome.method
    ));
    out.push_str(&format!("# Source: {}\n", outcome.metadata.source));
    out.push_str(&format!(
        "# Completed in {}\n\n",
        format_elapsed(outcome.metadata.elapsed_ms)
    ));
    out.push_str(outcome.transcript.trim());
    out.push('\n');

    if let Some(components) = &outcome.components {
        let sections = component_sections(components);
        if !sections.is_empty() {
            out.push('\n');
            for (label, text) in sections {
                out.push_str(&format!("{}: {}\n", label, text));
            }
        }
    }

    out
}

fn component_sections(components: &ScriptComponents) -> Vec<(&'static str, &str)> {
    [
        ("Hook", &components.hook),
        ("Bridge", &components.bridge),
        ("Golden nugget", &components.golden_nugget),
        ("Call to action", &components.call_to_action),
    ]
    .into_iter()
    .filter_map(|(label, text)| text.as_deref().map(|t| (label, t)))
    .collect()
}

fn scrape_as_text(result: &UnifiedVideoResult) -> String {
    let count = |value: Option<u64>| value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string());

    let mut out = format!(
        "{} {}\nURL: {}\n",
        result.platform.display_name(),
        result.canonical_id,
        result.source_url
    );

    if let Some(username) = &result.author.username {
        match &result.author.display_name {
            Some(name) => out.push_str(&format!("Author: @{} ({})\n", username, name)),
            None => out.push_str(&format!("Author: @{}\n", username)),
        }
    }
    if let Some(published) = result.timestamps.published_at {
        out.push_str(&format!("Published: {}\n", published.format("%Y-%m-%d %H:%M UTC")));
    }
    if let Some(duration) = result.duration_secs {
        out.push_str(&format!("Duration: {:.1}s\n", duration));
    }
    out.push_str(&format!(
        "Views: {}  Likes: {}  Comments: {}  Shares: {}\n",
        count(result.metrics.views),
        count(result.metrics.likes),
        count(result.metrics.comments),
        count(result.metrics.shares)
    ));
    if let Some(media) = &result.media_url {
        out.push_str(&format!("Media: {}\n", media));
    }
    if !result.text.is_empty() {
        out.push_str(&format!("\n{}\n", result.text));
    }

    out
}
