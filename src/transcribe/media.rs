use anyhow::Context;
use std::path::Path;

use crate::config::TranscriptionConfig;
use crate::utils::format_file_size;
use crate::{Result, ScribeError};

/// An uploaded media file, held in memory for the transcription call
#[derive(Clone)]
pub struct MediaFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl std::fmt::Debug for MediaFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaFile")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("size", &self.bytes.len())
            .finish()
    }
}

impl MediaFile {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_for(&file_name).to_string();
        Self {
            file_name,
            mime_type,
            bytes,
        }
    }

    /// Read a local file into memory once its name and on-disk size pass `policy`
    pub async fn from_path(path: &Path, policy: &MediaPolicy) -> Result<Self> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| ScribeError::InvalidInput(format!("not a file: {}", path.display())))?;
        if !metadata.is_file() {
            return Err(ScribeError::InvalidInput(format!("not a file: {}", path.display())).into());
        }

        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ScribeError::InvalidInput(format!("unreadable file name: {}", path.display())))?
            .to_string();

        policy.check_type(&file_name)?;
        policy.check_size(&file_name, metadata.len())?;

        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Ok(Self::new(file_name, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
}

/// Guess a MIME type from the extension
fn mime_for(file_name: &str) -> &'static str {
    match extension_of(file_name).as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("wav") => "audio/wav",
        Some("ogg") => "audio/ogg",
        _ => "application/octet-stream",
    }
}

/// Type and size rules checked before any upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPolicy {
    pub max_bytes: u64,
    pub allowed_extensions: Vec<String>,
}

impl MediaPolicy {
    pub fn from_config(config: &TranscriptionConfig) -> Self {
        Self {
            max_bytes: config.max_file_size_mb.saturating_mul(1024 * 1024),
            allowed_extensions: config
                .allowed_extensions
                .iter()
                .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn validate(&self, file: &MediaFile) -> Result<()> {
        self.check_type(&file.file_name)?;
        self.check_size(&file.file_name, file.size())
    }

    /// Extension and MIME rules, decided from the name alone
    pub fn check_type(&self, file_name: &str) -> Result<()> {
        let ext = extension_of(file_name).unwrap_or_default();
        if !self.allowed_extensions.iter().any(|allowed| *allowed == ext) {
            return Err(ScribeError::InvalidInput(format!(
                "'{}' is not an accepted media type (allowed: {})",
                file_name,
                self.allowed_extensions.join(", ")
            ))
            .into());
        }

        let mime_type = mime_for(file_name);
        if !(mime_type.starts_with("video/") || mime_type.starts_with("audio/")) {
            return Err(ScribeError::InvalidInput(format!("'{}' has non-media type {}", file_name, mime_type)).into());
        }

        Ok(())
    }

    pub fn check_size(&self, file_name: &str, size: u64) -> Result<()> {
        if size == 0 {
            return Err(ScribeError::InvalidInput(format!("'{}' is empty", file_name)).into());
        }

        if size > self.max_bytes {
            return Err(ScribeError::InvalidInput(format!(
                "'{}' is {}, limit is {}",
                file_name,
                format_file_size(size),
                format_file_size(self.max_bytes)
            ))
            .into());
        }

        Ok(())
    }
}

impl Default for MediaPolicy {
    fn default() -> Self {
        Self::from_config(&crate::config::Config::default().transcription)
    }
}
