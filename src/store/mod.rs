use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::platform::Platform;
use crate::transcribe::Method;
use crate::Result;

/// What gets written after a successful transcription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub id: Uuid,
    pub transcript: String,
    pub platform: Platform,
    pub method: Method,
    /// URL for remote content, file name for uploads
    pub source: String,
    pub requested_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Best-effort persistence collaborator. Failures are logged by the caller, never surfaced.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn append(&self, record: &TranscriptRecord) -> Result<()>;
}

/// Appends one JSON document per line to a history file
pub struct JsonlTranscriptStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlTranscriptStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record back, skipping lines that fail to parse
    pub async fn load_all(&self) -> Result<Vec<TranscriptRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read history file {}", self.path.display()))?;

        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable history line");
                    None
                }
            })
            .collect())
    }
}

#[async_trait]
impl TranscriptStore for JsonlTranscriptStore {
    async fn append(&self, record: &TranscriptRecord) -> Result<()> {
        let mut line = serde_json::to_string(record).context("Failed to serialize transcript record")?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent)?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open history file {}", self.path.display()))?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        tracing::debug!(id = %record.id, path = %self.path.display(), "Transcript persisted");
        Ok(())
    }
}

/// Store used when no history file is configured
pub struct NullStore;

#[async_trait]
impl TranscriptStore for NullStore {
    async fn append(&self, _record: &TranscriptRecord) -> Result<()> {
        Ok(())
    }
}
