use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::SourceConfig;

/// A resolved channel handle on the message source.
#[derive(Debug, Clone, Deserialize)]
pub struct Entity {
    pub id: i64,
    pub name: String,
    pub title: Option<String>,
}

/// A video-bearing message read from the channel stream.
///
/// Immutable once read; the fingerprint is derived from the five
/// identifying fields, `text` and `sender_id` ride along for caption
/// resolution.
#[derive(Debug, Clone)]
pub struct VideoCandidate {
    pub peer_id: Option<i64>,
    pub message_id: i64,
    pub sender_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub video_byte_size: Option<u64>,
    pub video_duration_seconds: Option<f64>,
    pub text: Option<String>,
}

/// A plain message fetched for context around a candidate.
#[derive(Debug, Clone)]
pub struct SourceMessage {
    pub message_id: i64,
    pub sender_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub text: Option<String>,
}

/// Read access to the ordered, append-only message stream.
///
/// Implementations must support oldest-first iteration and server-side
/// video filtering.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Resolve a channel name into a usable handle.
    async fn get_entity(&self, name: &str) -> Result<Entity>;

    /// One oldest-first page of video-bearing messages, starting `offset`
    /// items into the filtered stream. May return fewer than `limit`
    /// entries when the stream ends.
    async fn video_messages(
        &self,
        entity: &Entity,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<VideoCandidate>>;

    /// Fetch specific messages by id. Ids that do not exist are simply
    /// absent from the result.
    async fn messages_by_ids(&self, entity: &Entity, ids: &[i64]) -> Result<Vec<SourceMessage>>;

    /// Close the session with the source. Best-effort.
    async fn disconnect(&self) -> Result<()>;
}

/// Message source backed by an HTTP gateway in front of the chat service.
pub struct HttpMessageSource {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: i64,
    peer_id: Option<i64>,
    sender_id: Option<i64>,
    date: DateTime<Utc>,
    text: Option<String>,
    video: Option<WireVideo>,
}

#[derive(Debug, Deserialize)]
struct WireVideo {
    size: Option<u64>,
    duration: Option<f64>,
}

impl WireMessage {
    fn into_candidate(self) -> Option<VideoCandidate> {
        let video = self.video?;
        Some(VideoCandidate {
            peer_id: self.peer_id,
            message_id: self.id,
            sender_id: self.sender_id,
            timestamp: self.date,
            video_byte_size: video.size,
            video_duration_seconds: video.duration,
            text: self.text,
        })
    }

    fn into_source_message(self) -> SourceMessage {
        SourceMessage {
            message_id: self.id,
            sender_id: self.sender_id,
            timestamp: self.date,
            text: self.text,
        }
    }
}

impl HttpMessageSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("gateway error {}: {}", status, text));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl MessageSource for HttpMessageSource {
    async fn get_entity(&self, name: &str) -> Result<Entity> {
        let url = format!("{}/entities/{}", self.base_url, name);
        debug!("Resolving entity {}", name);
        self.get_json(&url).await
    }

    async fn video_messages(
        &self,
        entity: &Entity,
        offset: u64,
        limit: usize,
    ) -> Result<Vec<VideoCandidate>> {
        let url = format!(
            "{}/messages?entity={}&video_only=true&reverse=true&offset={}&limit={}",
            self.base_url, entity.id, offset, limit
        );
        debug!("Fetching video page at offset {} (limit {})", offset, limit);

        let messages: Vec<WireMessage> = self.get_json(&url).await?;
        Ok(messages
            .into_iter()
            .filter_map(WireMessage::into_candidate)
            .collect())
    }

    async fn messages_by_ids(&self, entity: &Entity, ids: &[i64]) -> Result<Vec<SourceMessage>> {
        let id_list = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let url = format!(
            "{}/messages/lookup?entity={}&ids={}",
            self.base_url, entity.id, id_list
        );

        let messages: Vec<WireMessage> = self.get_json(&url).await?;
        Ok(messages
            .into_iter()
            .map(WireMessage::into_source_message)
            .collect())
    }

    async fn disconnect(&self) -> Result<()> {
        let url = format!("{}/disconnect", self.base_url);
        let response = self.client.post(&url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow!("gateway disconnect failed: {}", response.status()));
        }

        Ok(())
    }
}
