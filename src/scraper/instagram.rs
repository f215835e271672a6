use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{as_timestamp, as_u64, non_empty, Author, ResolvedContent, Timestamps, UnifiedVideoResult, VideoMetrics};
use crate::platform::Platform;
use crate::{Result, ScribeError};

/// Map an Instagram post / reel payload to the unified shape.
///
/// Accepts both the GraphQL `xdt_shortcode_media` shape and the older `shortcode_media` one.
pub fn map_post(raw: &Value, resolved: &ResolvedContent, scraped_at: DateTime<Utc>) -> Result<UnifiedVideoResult> {
    let media = ["xdt_shortcode_media", "shortcode_media"]
        .iter()
        .find_map(|key| raw["data"].get(key).filter(|m| m.is_object()))
        .ok_or_else(|| ScribeError::Transient("Instagram payload is missing shortcode media".into()))?;

    let caption = media["edge_media_to_caption"]["edges"]
        .as_array()
        .and_then(|edges| edges.iter().find_map(|edge| non_empty(&edge["node"]["text"])))
        .unwrap_or_default();

    let comments = as_u64(&media["edge_media_to_parent_comment"]["count"])
        .or_else(|| as_u64(&media["edge_media_to_comment"]["count"]));

    Ok(UnifiedVideoResult {
        platform: Platform::Instagram,
        canonical_id: non_empty(&media["shortcode"]).unwrap_or_else(|| resolved.canonical_id.clone()),
        source_url: resolved.canonical_url.clone(),
        media_url: non_empty(&media["video_url"]),
        text: caption,
        author: Author {
            username: non_empty(&media["owner"]["username"]),
            display_name: non_empty(&media["owner"]["full_name"]),
        },
        metrics: VideoMetrics {
            views: as_u64(&media["video_play_count"]).or_else(|| as_u64(&media["video_view_count"])),
            likes: as_u64(&media["edge_media_preview_like"]["count"]),
            comments,
            shares: None,
        },
        duration_secs: media["video_duration"].as_f64(),
        timestamps: Timestamps {
            published_at: as_timestamp(&media["taken_at_timestamp"]),
            scraped_at,
        },
    })
}
