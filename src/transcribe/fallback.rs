use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::platform::Platform;

/// Phrases the primary service returns in place of a real transcript
pub const DEGRADED_SENTINELS: &[&str] = &[
    "transcription pending",
    "transcript unavailable",
    "transcription not available",
    "unable to transcribe",
    "could not transcribe",
    "no speech detected",
];

/// How a platform recovers when the primary service fails or degrades
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackStrategy {
    /// Text from the scraper's transcript endpoint
    ScrapedText,
    None,
}

impl fmt::Display for FallbackStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackStrategy::ScrapedText => f.write_str("scraped transcript"),
            FallbackStrategy::None => f.write_str("none"),
        }
    }
}

/// Platform to fallback strategy. Platforms missing from the table have no fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackTable {
    entries: HashMap<Platform, FallbackStrategy>,
}

impl FallbackTable {
    /// Table with no fallbacks at all
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn with(mut self, platform: Platform, strategy: FallbackStrategy) -> Self {
        self.entries.insert(platform, strategy);
        self
    }

    pub fn strategy_for(&self, platform: Platform) -> FallbackStrategy {
        self.entries.get(&platform).copied().unwrap_or(FallbackStrategy::None)
    }

    /// Every supported platform with its strategy, for display
    pub fn entries(&self) -> Vec<(Platform, FallbackStrategy)> {
        Platform::supported()
            .iter()
            .map(|platform| (*platform, self.strategy_for(*platform)))
            .collect()
    }
}

impl Default for FallbackTable {
    /// Only TikTok exposes a scraped transcript
    fn default() -> Self {
        Self::empty()
            .with(Platform::TikTok, FallbackStrategy::ScrapedText)
            .with(Platform::Instagram, FallbackStrategy::None)
    }
}

/// Why a transport-level success should be treated as a placeholder, if it should
pub fn degraded_reason(transcript: &str, metadata: &BTreeMap<String, Value>) -> Option<String> {
    if metadata.get("method").and_then(Value::as_str) == Some("fallback") {
        return Some("service reported method=fallback".to_string());
    }

    if transcript.trim().is_empty() {
        return Some("empty transcript".to_string());
    }

    let lowered = transcript.to_lowercase();
    DEGRADED_SENTINELS
        .iter()
        .find(|sentinel| lowered.contains(*sentinel))
        .map(|sentinel| format!("transcript contains '{}'", sentinel))
}

pub fn is_degraded(transcript: &str, metadata: &BTreeMap<String, Value>) -> bool {
    degraded_reason(transcript, metadata).is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_table_is_asymmetric() {
        let table = FallbackTable::default();
        assert_eq!(table.strategy_for(Platform::TikTok), FallbackStrategy::ScrapedText);
        assert_eq!(table.strategy_for(Platform::Instagram), FallbackStrategy::None);
        assert_eq!(table.strategy_for(Platform::Unsupported), FallbackStrategy::None);
    }

    #[test]
    fn test_entries_cover_supported_platforms() {
        let entries = FallbackTable::empty().entries();
        assert_eq!(entries.len(), Platform::supported().len());
        assert!(entries.iter().all(|(_, s)| *s == FallbackStrategy::None));
    }

    #[test]
    fn test_sentinel_phrase_is_degraded() {
        let meta = BTreeMap::new();
        let reason = degraded_reason("Transcription pending, check back later", &meta).unwrap();
        assert!(reason.contains("transcription pending"));
        assert!(!is_degraded("a real transcript about hooks", &meta));
    }

    #[test]
    fn test_fallback_method_tag_is_degraded() {
        let mut meta = BTreeMap::new();
        meta.insert("method".to_string(), json!("fallback"));
        assert!(is_degraded("looks fine", &meta));

        meta.insert("method".to_string(), json!("gemini"));
        assert!(!is_degraded("looks fine", &meta));
    }

    #[test]
    fn test_blank_is_degraded() {
        assert!(is_degraded(" \n\t", &BTreeMap::new()));
    }
}
