use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use url::Url;

/// Platforms the scraping and transcription paths know how to handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    TikTok,
    Instagram,
    Unsupported,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::TikTok => "tiktok",
            Platform::Instagram => "instagram",
            Platform::Unsupported => "unsupported",
        }
    }

    /// Human readable name
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::TikTok => "TikTok",
            Platform::Instagram => "Instagram",
            Platform::Unsupported => "Unsupported",
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Platform::Unsupported)
    }

    pub fn supported() -> &'static [Platform] {
        &[Platform::TikTok, Platform::Instagram]
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tiktok" | "tt" => Ok(Platform::TikTok),
            "instagram" | "ig" | "insta" => Ok(Platform::Instagram),
            other => Err(format!("unknown platform '{}' (expected tiktok or instagram)", other)),
        }
    }
}

/// What kind of page a URL points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    /// A single video / reel / post
    Video,
    /// A creator profile page
    Profile,
    Unknown,
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentType::Video => "video",
            ContentType::Profile => "profile",
            ContentType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Outcome of classifying a URL or filename
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    pub platform: Platform,
    pub content_type: ContentType,
    /// Canonical URL form, `None` for filenames and unparseable input
    pub normalized: Option<String>,
}

impl Detection {
    fn unsupported(normalized: Option<String>) -> Self {
        Self {
            platform: Platform::Unsupported,
            content_type: ContentType::Unknown,
            normalized,
        }
    }

    pub fn is_supported(&self) -> bool {
        self.platform.is_supported()
    }
}

/// One row of the detection table
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    pub pattern: &'static str,
    pub platform: Platform,
    pub content_type: ContentType,
    pub short_link: bool,
}

/// Every platform signature, matched top to bottom against the normalized URL.
pub const URL_SIGNATURES: &[Signature] = &[
    Signature {
        pattern: r"^https://(?:vm|vt)\.tiktok\.com/[A-Za-z0-9]+/?$",
        platform: Platform::TikTok,
        content_type: ContentType::Video,
        short_link: true,
    },
    Signature {
        pattern: r"^https://www\.tiktok\.com/t/[A-Za-z0-9]+/?$",
        platform: Platform::TikTok,
        content_type: ContentType::Video,
        short_link: true,
    },
    Signature {
        pattern: r"^https://www\.tiktok\.com/@[\w.-]+/(?:video|photo)/\d+/?$",
        platform: Platform::TikTok,
        content_type: ContentType::Video,
        short_link: false,
    },
    Signature {
        pattern: r"^https://www\.tiktok\.com/@[\w.-]+/?$",
        platform: Platform::TikTok,
        content_type: ContentType::Profile,
        short_link: false,
    },
    Signature {
        pattern: r"^https://www\.instagram\.com/(?:[\w.]+/)?(?:p|reel|reels|tv)/[\w-]+/?$",
        platform: Platform::Instagram,
        content_type: ContentType::Video,
        short_link: false,
    },
    // Site sections that would otherwise pass for usernames
    Signature {
        pattern: r"^https://www\.instagram\.com/(?:explore|reels?|p|tv|stories|accounts|direct|about|legal|developer)(?:/.*)?$",
        platform: Platform::Instagram,
        content_type: ContentType::Unknown,
        short_link: false,
    },
    Signature {
        pattern: r"^https://www\.instagram\.com/[\w.]+/?$",
        platform: Platform::Instagram,
        content_type: ContentType::Profile,
        short_link: false,
    },
];

/// Platform keywords recognised in uploaded file names
const FILE_SIGNATURES: &[(&str, Platform)] = &[
    (r"(?i)tiktok|(?:^|[_\-. ])tt(?:[_\-. ]|$)", Platform::TikTok),
    (r"(?i)instagram|(?:^|[_\-. ])(?:ig|reel)(?:[_\-. ]|$)", Platform::Instagram),
];

/// Extensions treated as uploaded media rather than URLs
pub const MEDIA_EXTENSIONS: &[&str] = &["mp4", "mov", "m4v", "webm", "mkv", "mp3", "m4a", "wav", "aac", "ogg"];

static COMPILED_URL_SIGNATURES: Lazy<Vec<(Regex, Signature)>> = Lazy::new(|| {
    URL_SIGNATURES
        .iter()
        .map(|sig| (Regex::new(sig.pattern).expect("Invalid platform pattern"), *sig))
        .collect()
});

static COMPILED_FILE_SIGNATURES: Lazy<Vec<(Regex, Platform)>> = Lazy::new(|| {
    FILE_SIGNATURES
        .iter()
        .map(|(pattern, platform)| (Regex::new(pattern).expect("Invalid file pattern"), *platform))
        .collect()
});

static TIKTOK_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(?:video|photo)/(\d+)").expect("Invalid regex"));

static INSTAGRAM_SHORTCODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/(?:p|reel|reels|tv)/([\w-]+)").expect("Invalid regex"));

/// Pure pattern matcher that classifies URLs and filenames. Never touches the network.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformDetector;

impl PlatformDetector {
    pub fn new() -> Self {
        Self
    }

    /// Classify raw user input (URL with or without scheme, or a media filename)
    pub fn detect(&self, input: &str) -> Detection {
        let input = input.trim();
        if input.is_empty() {
            return Detection::unsupported(None);
        }

        if is_media_filename(input) {
            return self.detect_file(input);
        }

        let Some(normalized) = normalize_url(input) else {
            return Detection::unsupported(None);
        };

        match find_signature(&normalized) {
            Some(sig) => Detection {
                platform: sig.platform,
                content_type: sig.content_type,
                normalized: Some(normalized),
            },
            None => Detection::unsupported(Some(normalized)),
        }
    }

    /// Classify an uploaded file by platform keywords in its name
    pub fn detect_file(&self, file_name: &str) -> Detection {
        let stem = Path::new(file_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(file_name);

        COMPILED_FILE_SIGNATURES
            .iter()
            .find(|(re, _)| re.is_match(stem))
            .map(|(_, platform)| Detection {
                platform: *platform,
                content_type: ContentType::Video,
                normalized: None,
            })
            .unwrap_or_else(|| Detection::unsupported(None))
    }

    /// True when the URL must be resolved over the network before an id can be read
    pub fn is_short_link(&self, normalized: &str) -> bool {
        find_signature(normalized).map(|sig| sig.short_link).unwrap_or(false)
    }

    /// Read the canonical content id straight out of a full (non-short) URL
    pub fn extract_content_id(&self, platform: Platform, url: &str) -> Option<String> {
        let re = match platform {
            Platform::TikTok => &*TIKTOK_ID_RE,
            Platform::Instagram => &*INSTAGRAM_SHORTCODE_RE,
            Platform::Unsupported => return None,
        };
        re.captures(url)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
    }
}

fn find_signature(normalized: &str) -> Option<Signature> {
    COMPILED_URL_SIGNATURES
        .iter()
        .find(|(re, _)| re.is_match(normalized))
        .map(|(_, sig)| *sig)
}

fn is_media_filename(input: &str) -> bool {
    if input.contains("://") {
        return false;
    }
    Path::new(input)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| MEDIA_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Normalize URL variants to canonical form.
///
/// Adds a missing `https://` scheme, upgrades `http`, folds `m.`/`mobile.`/`www.` onto the
/// canonical `www.` host for known platforms and drops query strings and fragments.
pub fn normalize_url(input: &str) -> Option<String> {
    let input = input.trim();
    let with_scheme = if input.contains("://") {
        input.to_string()
    } else {
        format!("https://{}", input.trim_start_matches('/'))
    };

    let mut parsed = Url::parse(&with_scheme).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.set_scheme("https").ok()?;

    let host = parsed.host_str()?.to_lowercase();
    if !host.contains('.') {
        return None;
    }

    let bare = host
        .trim_start_matches("www.")
        .trim_start_matches("mobile.")
        .trim_start_matches("m.");
    let canonical_host = match bare {
        "tiktok.com" => "www.tiktok.com".to_string(),
        "instagram.com" => "www.instagram.com".to_string(),
        _ => host.clone(),
    };
    if canonical_host != host {
        parsed.set_host(Some(&canonical_host)).ok()?;
    }

    parsed.set_query(None);
    parsed.set_fragment(None);

    Some(parsed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiktok_short_link_is_video() {
        let detection = PlatformDetector::new().detect("https://vm.tiktok.com/ZMN123ABC/");
        assert_eq!(detection.platform, Platform::TikTok);
        assert_eq!(detection.content_type, ContentType::Video);
        assert_eq!(detection.normalized.as_deref(), Some("https://vm.tiktok.com/ZMN123ABC/"));
    }

    #[test]
    fn test_youtube_is_unsupported() {
        let detection = PlatformDetector::new().detect("https://youtube.com/watch?v=1");
        assert_eq!(detection.platform, Platform::Unsupported);
        assert!(!detection.is_supported());
    }

    #[test]
    fn test_normalizes_missing_scheme_and_mobile_host() {
        let detector = PlatformDetector::new();
        let detection = detector.detect("m.tiktok.com/@creator/video/7234567890123456789?lang=en");
        assert_eq!(detection.platform, Platform::TikTok);
        assert_eq!(detection.content_type, ContentType::Video);
        assert_eq!(
            detection.normalized.as_deref(),
            Some("https://www.tiktok.com/@creator/video/7234567890123456789")
        );
    }

    #[test]
    fn test_instagram_reel_and_profile() {
        let detector = PlatformDetector::new();

        let reel = detector.detect("http://instagram.com/reel/Cx1AbC-9z/?igsh=abc");
        assert_eq!(reel.platform, Platform::Instagram);
        assert_eq!(reel.content_type, ContentType::Video);

        let profile = detector.detect("https://www.instagram.com/some.creator/");
        assert_eq!(profile.platform, Platform::Instagram);
        assert_eq!(profile.content_type, ContentType::Profile);
    }

    #[test]
    fn test_instagram_site_sections_are_not_profiles() {
        let detector = PlatformDetector::new();

        for url in [
            "https://www.instagram.com/explore/",
            "https://www.instagram.com/reels/",
            "https://www.instagram.com/p/",
            "instagram.com/accounts/login/",
            "https://www.instagram.com/stories/some.creator/",
        ] {
            let detection = detector.detect(url);
            assert_eq!(detection.platform, Platform::Instagram, "{}", url);
            assert_eq!(detection.content_type, ContentType::Unknown, "{}", url);
        }

        // Still content or usernames
        assert_eq!(
            detector.detect("https://www.instagram.com/reels/Cx1AbC-9z/").content_type,
            ContentType::Video
        );
        assert_eq!(
            detector.detect("https://www.instagram.com/explorer.daily/").content_type,
            ContentType::Profile
        );
    }

    #[test]
    fn test_tiktok_profile() {
        let detection = PlatformDetector::new().detect("tiktok.com/@some_creator");
        assert_eq!(detection.platform, Platform::TikTok);
        assert_eq!(detection.content_type, ContentType::Profile);
    }

    #[test]
    fn test_short_link_flag() {
        let detector = PlatformDetector::new();
        assert!(detector.is_short_link("https://vm.tiktok.com/ZMN123ABC/"));
        assert!(detector.is_short_link("https://www.tiktok.com/t/ZT8abcdEf/"));
        assert!(!detector.is_short_link("https://www.tiktok.com/@a/video/123"));
    }

    #[test]
    fn test_extract_content_id() {
        let detector = PlatformDetector::new();
        assert_eq!(
            detector.extract_content_id(Platform::TikTok, "https://www.tiktok.com/@a/video/7234567890"),
            Some("7234567890".to_string())
        );
        assert_eq!(
            detector.extract_content_id(Platform::Instagram, "https://www.instagram.com/p/Cx1AbC-9z/"),
            Some("Cx1AbC-9z".to_string())
        );
        assert_eq!(detector.extract_content_id(Platform::Unsupported, "https://x.com/a"), None);
    }

    #[test]
    fn test_filename_detection() {
        let detector = PlatformDetector::new();
        assert_eq!(detector.detect("my_tiktok_clip.mp4").platform, Platform::TikTok);
        assert_eq!(detector.detect("ig_reel_2024.mov").platform, Platform::Instagram);
        assert_eq!(detector.detect("holiday.mp4").platform, Platform::Unsupported);
        assert_eq!(detector.detect("my_tiktok_clip.mp4").normalized, None);
    }

    #[test]
    fn test_garbage_input() {
        let detector = PlatformDetector::new();
        assert!(!detector.detect("").is_supported());
        assert!(!detector.detect("not a url").is_supported());
        assert!(!detector.detect("ftp://tiktok.com/@a").is_supported());
    }

    #[test]
    fn test_platform_from_str() {
        assert_eq!("TikTok".parse::<Platform>(), Ok(Platform::TikTok));
        assert_eq!("ig".parse::<Platform>(), Ok(Platform::Instagram));
        assert!("youtube".parse::<Platform>().is_err());
    }
}
