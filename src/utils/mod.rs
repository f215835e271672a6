use reqwest::StatusCode;

use crate::queue::classify_status_code;
use crate::{ErrorClass, ScribeError};

/// Translate a non-success HTTP response into a classified error.
///
/// Every upstream client funnels its failures through here so the retrier sees a typed
/// classification instead of sniffing messages.
pub fn error_for_status(service: &str, status: StatusCode, body: &str) -> ScribeError {
    let detail = format!("{} returned HTTP {}: {}", service, status, truncate(body.trim(), 200));

    match classify_status_code(status.as_u16()) {
        ErrorClass::Permanent => ScribeError::Permanent(detail),
        ErrorClass::RateLimited => ScribeError::RateLimited(detail),
        ErrorClass::Transient => ScribeError::Transient(detail),
    }
}

/// Cut `text` to at most `max` characters, appending an ellipsis when shortened
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut)
}

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Format a duration in milliseconds for display
pub fn format_elapsed(millis: u64) -> String {
    if millis < 1000 {
        format!("{}ms", millis)
    } else {
        let seconds = millis as f64 / 1000.0;
        if seconds < 60.0 {
            format!("{:.1}s", seconds)
        } else {
            format!("{}m {}s", millis / 60_000, (millis % 60_000) / 1000)
        }
    }
}

/// True when a string is empty or only whitespace
pub fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}
