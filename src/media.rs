use async_trait::async_trait;
use futures::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::config::SourceConfig;
use crate::publish::PublishError;
use crate::source::Entity;

/// A downloaded video held in a temporary file. The file is removed when
/// this value drops, so media never outlives the run that fetched it.
pub struct TempMedia {
    file: NamedTempFile,
}

impl TempMedia {
    pub fn new(file: NamedTempFile) -> Self {
        Self { file }
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Fetch the binary media of a message into local scratch storage.
///
/// Errors carry status and message text so the failure classifier can treat
/// a broken download like a failed publish.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, entity: &Entity, message_id: i64) -> Result<TempMedia, PublishError>;
}

/// Streams message media from the gateway into a scratch-dir tempfile.
pub struct HttpMediaFetcher {
    base_url: String,
    scratch_dir: PathBuf,
    client: reqwest::Client,
}

impl HttpMediaFetcher {
    pub fn new(config: &SourceConfig, scratch_dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        // Media bodies can dwarf normal API responses.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds * 10))
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            scratch_dir: scratch_dir.into(),
            client,
        })
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch(&self, entity: &Entity, message_id: i64) -> Result<TempMedia, PublishError> {
        let url = format!(
            "{}/media?entity={}&message_id={}",
            self.base_url, entity.id, message_id
        );

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(PublishError::from_transport)?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(PublishError::new(Some(status.as_u16()), text));
        }

        std::fs::create_dir_all(&self.scratch_dir)
            .map_err(|e| PublishError::new(None, format!("cannot create scratch dir: {}", e)))?;
        let mut file = tempfile::Builder::new()
            .prefix("relay-media-")
            .suffix(".mp4")
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| PublishError::new(None, format!("cannot create media file: {}", e)))?;

        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(PublishError::from_transport)?;
            file.write_all(&chunk)
                .map_err(|e| PublishError::new(None, format!("cannot write media file: {}", e)))?;
            written += chunk.len() as u64;
        }

        debug!("📥 Downloaded {} bytes for message {}", written, message_id);
        Ok(TempMedia::new(file))
    }
}
