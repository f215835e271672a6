use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use std::time::Duration;

use super::{MediaFile, PrimaryTranscript, TranscriptionService};
use crate::config::TranscriptionConfig;
use crate::platform::Platform;
use crate::utils::error_for_status;
use crate::{Result, ScribeError};

const SERVICE: &str = "Transcription service";

#[derive(Debug, Serialize)]
struct UrlTranscriptionRequest<'a> {
    url: &'a str,
    platform: Platform,
    model: &'a str,
}

/// JSON-over-HTTP client for the generative transcription service
pub struct HttpTranscriptionService {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
}

impl HttpTranscriptionService {
    pub fn new(config: &TranscriptionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent(concat!("reelscribe/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build transcription client")?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn url_endpoint(&self) -> String {
        format!("{}/transcriptions", self.endpoint)
    }

    fn upload_endpoint(&self, file_name: &str) -> String {
        format!(
            "{}/transcriptions/upload?filename={}&model={}",
            self.endpoint,
            urlencoding::encode(file_name),
            urlencoding::encode(&self.model)
        )
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<PrimaryTranscript> {
        let response = self
            .authorize(request)
            .send()
            .await
            .context("Transcription request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(SERVICE, status, &body).into());
        }

        let transcript: PrimaryTranscript = response
            .json()
            .await
            .map_err(|e| ScribeError::Transient(format!("{} returned an unexpected body: {}", SERVICE, e)))?;

        Ok(transcript)
    }
}

#[async_trait]
impl TranscriptionService for HttpTranscriptionService {
    async fn transcribe_url(&self, url: &str, platform: Platform) -> Result<PrimaryTranscript> {
        tracing::debug!(url = %url, platform = %platform, model = %self.model, "Requesting URL transcription");

        let body = UrlTranscriptionRequest {
            url,
            platform,
            model: &self.model,
        };
        self.send(self.client.post(self.url_endpoint()).json(&body)).await
    }

    async fn transcribe_file(&self, file: &MediaFile) -> Result<PrimaryTranscript> {
        tracing::debug!(file = %file.file_name, size = file.size(), "Uploading media for transcription");

        let request = self
            .client
            .post(self.upload_endpoint(&file.file_name))
            .header(reqwest::header::CONTENT_TYPE, file.mime_type.as_str())
            .body(file.bytes.clone());
        self.send(request).await
    }
}
