use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{as_timestamp, as_u64, non_empty, Author, ResolvedContent, Timestamps, UnifiedVideoResult, VideoMetrics};
use crate::platform::Platform;
use crate::{Result, ScribeError};

/// Map a TikTok video payload (`aweme_detail`) to the unified shape
pub fn map_video(raw: &Value, resolved: &ResolvedContent, scraped_at: DateTime<Utc>) -> Result<UnifiedVideoResult> {
    let detail = raw
        .get("aweme_detail")
        .filter(|d| d.is_object())
        .ok_or_else(|| ScribeError::Transient("TikTok payload is missing 'aweme_detail'".into()))?;

    let canonical_id = non_empty(&detail["aweme_id"]).unwrap_or_else(|| resolved.canonical_id.clone());

    let media_url = detail["video"]["play_addr"]["url_list"]
        .as_array()
        .and_then(|urls| urls.iter().find_map(non_empty))
        .or_else(|| non_empty(&detail["video"]["download_addr"]["url_list"][0]));

    // Duration is reported in milliseconds on video payloads
    let duration_secs = as_u64(&detail["video"]["duration"]).map(|ms| ms as f64 / 1000.0);

    let stats = &detail["statistics"];

    Ok(UnifiedVideoResult {
        platform: Platform::TikTok,
        canonical_id,
        source_url: resolved.canonical_url.clone(),
        media_url,
        text: non_empty(&detail["desc"]).unwrap_or_default(),
        author: Author {
            username: non_empty(&detail["author"]["unique_id"]),
            display_name: non_empty(&detail["author"]["nickname"]),
        },
        metrics: VideoMetrics {
            views: as_u64(&stats["play_count"]),
            likes: as_u64(&stats["digg_count"]),
            comments: as_u64(&stats["comment_count"]),
            shares: as_u64(&stats["share_count"]),
        },
        duration_secs,
        timestamps: Timestamps {
            published_at: as_timestamp(&detail["create_time"]),
            scraped_at,
        },
    })
}

/// Pull plain text out of a transcript payload. Empty text is returned, not rejected.
pub fn extract_transcript(raw: &Value) -> Result<String> {
    let transcript = raw
        .get("transcript")
        .and_then(Value::as_str)
        .ok_or_else(|| ScribeError::Transient("TikTok transcript payload has no 'transcript' field".into()))?;

    Ok(webvtt_to_text(transcript))
}

/// Strip WEBVTT headers, cue ids and timing lines, joining the cue text with spaces.
/// Plain text input passes through unchanged apart from whitespace folding.
pub fn webvtt_to_text(input: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut in_note = false;

    for line in input.lines() {
        let line = line.trim();

        if line.is_empty() {
            in_note = false;
            continue;
        }
        if in_note {
            continue;
        }
        if line.starts_with("WEBVTT") || line.starts_with("STYLE") || line.starts_with("REGION") {
            continue;
        }
        if line.starts_with("NOTE") {
            in_note = true;
            continue;
        }
        if line.contains("-->") {
            continue;
        }
        if line.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        // Consecutive cues frequently repeat the previous line
        if lines.last() == Some(&line) {
            continue;
        }
        lines.push(line);
    }

    lines.join(" ")
}
