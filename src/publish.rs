use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::PublishConfig;

/// Error surfaced by the publish step.
///
/// The publish service exposes no structured error taxonomy, so this keeps
/// whatever status code and message text came back for the classifier to
/// inspect.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PublishError {
    pub status: Option<u16>,
    pub message: String,
}

impl PublishError {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn from_transport(err: reqwest::Error) -> Self {
        Self {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Upload a local media file with its final caption, returning the created
/// post identifier.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, media: &Path, caption: &str) -> Result<String, PublishError>;
}

/// Publisher backed by a multipart HTTP upload endpoint.
pub struct HttpPublisher {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct PublishResponse {
    id: String,
}

impl HttpPublisher {
    pub fn new(config: &PublishConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            client,
        })
    }
}

#[async_trait]
impl Publisher for HttpPublisher {
    async fn publish(&self, media: &Path, caption: &str) -> Result<String, PublishError> {
        let bytes = tokio::fs::read(media)
            .await
            .map_err(|e| PublishError::new(None, format!("cannot read media file: {}", e)))?;

        let file_name = media
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video.mp4".to_string());

        debug!("Uploading {} ({} bytes)", file_name, bytes.len());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("video/mp4")
            .map_err(PublishError::from_transport)?;
        let form = reqwest::multipart::Form::new()
            .text("caption", caption.to_string())
            .part("media", part);

        let mut builder = self.client.post(&self.endpoint).multipart(form);
        if let Some(api_key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = builder.send().await.map_err(PublishError::from_transport)?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PublishError::new(Some(status.as_u16()), text));
        }

        let parsed: PublishResponse = response.json().await.map_err(PublishError::from_transport)?;
        Ok(parsed.id)
    }
}

/// Truncate a caption to the platform's character limit, ellipsized so the
/// result never exceeds `limit` characters.
pub fn truncate_caption(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }

    let keep = limit.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}
