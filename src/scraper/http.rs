use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

use super::{Endpoint, ScrapeApi, ScrapeRequest};
use crate::config::ScrapeApiConfig;
use crate::platform::Platform;
use crate::utils::error_for_status;
use crate::{Result, ScribeError};

const SERVICE: &str = "Scrape API";

/// `reqwest` client for the keyed scraping API
pub struct HttpScrapeApi {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    api_key_header: String,
}

impl HttpScrapeApi {
    pub fn new(config: &ScrapeApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("reelscribe/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build scrape API client")?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_key_header: config.api_key_header.clone(),
        })
    }

    /// One endpoint per platform and content type
    pub fn endpoint_path(platform: Platform, endpoint: Endpoint) -> Option<&'static str> {
        match (platform, endpoint) {
            (Platform::TikTok, Endpoint::Video) => Some("/v2/tiktok/video"),
            (Platform::TikTok, Endpoint::Transcript) => Some("/v1/tiktok/video/transcript"),
            (Platform::Instagram, Endpoint::Video) => Some("/v1/instagram/post"),
            _ => None,
        }
    }

    fn request_url(&self, request: &ScrapeRequest) -> Result<String> {
        let path = Self::endpoint_path(request.platform, request.endpoint).ok_or_else(|| {
            ScribeError::Unsupported(format!(
                "{} has no {:?} endpoint",
                request.platform, request.endpoint
            ))
        })?;

        Ok(format!(
            "{}{}?url={}",
            self.base_url,
            path,
            urlencoding::encode(&request.url)
        ))
    }
}

#[async_trait]
impl ScrapeApi for HttpScrapeApi {
    async fn fetch(&self, request: &ScrapeRequest) -> Result<Value> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ScribeError::Config("scrape API key is not configured".into()))?;
        let url = self.request_url(request)?;

        tracing::debug!(platform = %request.platform, endpoint = ?request.endpoint, "Calling scrape API");

        let response = self
            .client
            .get(&url)
            .header(self.api_key_header.as_str(), api_key)
            .send()
            .await
            .context("Scrape API request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(SERVICE, status, &body).into());
        }

        let payload: Value = response
            .json()
            .await
            .context("Scrape API returned invalid JSON")?;

        // Some endpoints report failures inside a 200 body
        if payload.get("success").and_then(Value::as_bool) == Some(false) {
            let message = payload["message"].as_str().unwrap_or("unknown error");
            return Err(ScribeError::Transient(format!("{} reported failure: {}", SERVICE, message)).into());
        }

        Ok(payload)
    }

    async fn resolve(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to resolve short link {}", url))?;

        let status = response.status();
        if !status.is_success() && !status.is_redirection() {
            return Err(error_for_status("Short link host", status, "").into());
        }

        Ok(response.url().to_string())
    }
}
