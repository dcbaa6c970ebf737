use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::failure::ReasonCategory;

const CURSOR_FILE: &str = "cursor.json";
const PROCESSED_FILE: &str = "processed.json";
const FAILED_FILE: &str = "failed.json";

/// Durable scan position in the filtered video stream.
///
/// `total_processed` is advisory, kept for observability only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorState {
    pub offset: u64,
    pub last_updated: DateTime<Utc>,
    pub total_processed: u64,
}

impl Default for CursorState {
    fn default() -> Self {
        Self {
            offset: 0,
            last_updated: Utc::now(),
            total_processed: 0,
        }
    }
}

/// A single terminal failure, normalized from either on-disk encoding.
#[derive(Debug, Clone)]
pub struct FailedRecord {
    pub fingerprint: String,
    pub reason: String,
    pub failed_at: Option<DateTime<Utc>>,
    pub raw_error: Option<String>,
}

/// Durable dedup state: processed fingerprints, failed records and the scan
/// cursor, each in its own JSON file under the state directory.
///
/// Every mutating call serializes the full new file content before touching
/// the file, so a crash mid-run loses at most the latest mutation and never
/// corrupts earlier state. Unreadable files degrade to empty state with a
/// warning; only an unusable state directory is fatal.
pub struct StateStore {
    state_dir: PathBuf,
    processed: Vec<String>,
    processed_index: HashSet<String>,
    failed: Vec<FailedRecord>,
    failed_index: HashSet<String>,
    cursor: CursorState,
}

/// Both accepted on-disk shapes for the processed/failed collections: the
/// current object form with metadata, and the legacy bare array.
#[derive(Deserialize)]
#[serde(untagged)]
enum SetFile {
    Structured { videos: Vec<String> },
    Legacy(Vec<String>),
}

/// Structured failed entry, stored JSON-encoded inside the `videos` array.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FailedEntry {
    video_id: String,
    reason: String,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessedFileOut<'a> {
    last_updated: DateTime<Utc>,
    total_processed: usize,
    videos: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FailedFileOut {
    last_updated: DateTime<Utc>,
    total_failed: usize,
    videos: Vec<String>,
}

/// Decode one failed-set entry. Entries are either a JSON-encoded record or
/// a legacy bare fingerprint; legacy entries get sentinel metadata.
fn normalize_failed_entry(entry: String) -> FailedRecord {
    match serde_json::from_str::<FailedEntry>(&entry) {
        Ok(parsed) => FailedRecord {
            fingerprint: parsed.video_id,
            reason: parsed.reason,
            failed_at: parsed.timestamp,
            raw_error: parsed.error,
        },
        Err(_) => FailedRecord {
            fingerprint: entry,
            reason: ReasonCategory::Unknown.to_string(),
            failed_at: None,
            raw_error: None,
        },
    }
}

impl StateStore {
    /// Open the store, creating the state directory if needed and loading
    /// whatever state files already exist.
    pub async fn open(state_dir: impl Into<PathBuf>) -> Result<Self> {
        let state_dir = state_dir.into();
        fs::create_dir_all(&state_dir).await.with_context(|| {
            format!(
                "cannot initialize state directory {}",
                state_dir.display()
            )
        })?;

        let processed = Self::load_set(&state_dir.join(PROCESSED_FILE)).await;
        let failed: Vec<FailedRecord> = Self::load_set(&state_dir.join(FAILED_FILE))
            .await
            .into_iter()
            .map(normalize_failed_entry)
            .collect();
        let cursor = Self::load_cursor(&state_dir.join(CURSOR_FILE)).await;

        let processed_index: HashSet<String> = processed.iter().cloned().collect();
        let failed_index: HashSet<String> =
            failed.iter().map(|r| r.fingerprint.clone()).collect();

        info!(
            "📊 State loaded: {} processed, {} failed, cursor at offset {}",
            processed.len(),
            failed.len(),
            cursor.offset
        );

        Ok(Self {
            state_dir,
            processed,
            processed_index,
            failed,
            failed_index,
            cursor,
        })
    }

    async fn load_set(path: &Path) -> Vec<String> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {}, starting empty", path.display());
                return Vec::new();
            }
            Err(e) => {
                warn!("Failed to read {}: {} (starting empty)", path.display(), e);
                return Vec::new();
            }
        };

        match serde_json::from_str::<SetFile>(&content) {
            Ok(SetFile::Structured { videos }) => videos,
            Ok(SetFile::Legacy(videos)) => {
                debug!("Legacy bare-array shape in {}", path.display());
                videos
            }
            Err(e) => {
                warn!("Failed to parse {}: {} (starting empty)", path.display(), e);
                Vec::new()
            }
        }
    }

    async fn load_cursor(path: &Path) -> CursorState {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {} (starting at 0)", path.display(), e);
                }
                return CursorState::default();
            }
        };

        match serde_json::from_str(&content) {
            Ok(cursor) => cursor,
            Err(e) => {
                warn!("Failed to parse {}: {} (starting at 0)", path.display(), e);
                CursorState::default()
            }
        }
    }

    pub fn is_processed(&self, fingerprint: &str) -> bool {
        self.processed_index.contains(fingerprint)
    }

    /// True when the fingerprint has a terminal failure on record, whichever
    /// encoding the entry was stored in.
    pub fn is_failed(&self, fingerprint: &str) -> bool {
        self.failed_index.contains(fingerprint)
    }

    pub fn cursor(&self) -> &CursorState {
        &self.cursor
    }

    pub fn processed_fingerprints(&self) -> &[String] {
        &self.processed
    }

    pub fn failed_records(&self) -> &[FailedRecord] {
        &self.failed
    }

    /// Record a successful publish and persist the processed set plus the
    /// advisory processed counter.
    pub async fn mark_processed(&mut self, fingerprint: &str) -> Result<()> {
        if self.processed_index.insert(fingerprint.to_string()) {
            self.processed.push(fingerprint.to_string());
        }
        self.cursor.total_processed += 1;
        self.cursor.last_updated = Utc::now();

        self.save_processed().await?;
        self.save_cursor().await?;

        debug!("💾 Marked processed: {}", fingerprint);
        Ok(())
    }

    /// Record a terminal failure. Repeated failures for the same fingerprint
    /// append another record; wasteful but harmless.
    pub async fn mark_failed(
        &mut self,
        fingerprint: &str,
        reason: ReasonCategory,
        raw_error: Option<String>,
    ) -> Result<()> {
        self.failed.push(FailedRecord {
            fingerprint: fingerprint.to_string(),
            reason: reason.to_string(),
            failed_at: Some(Utc::now()),
            raw_error,
        });
        self.failed_index.insert(fingerprint.to_string());

        self.save_failed().await?;

        debug!("💾 Marked failed ({}): {}", reason, fingerprint);
        Ok(())
    }

    /// Move the scan cursor forward and persist it. Backward moves are
    /// refused; the offset never decreases.
    pub async fn advance_cursor(&mut self, offset: u64) -> Result<()> {
        if offset < self.cursor.offset {
            warn!(
                "Refusing to move cursor backward ({} -> {})",
                self.cursor.offset, offset
            );
            return Ok(());
        }

        self.cursor.offset = offset;
        self.cursor.last_updated = Utc::now();
        self.save_cursor().await
    }

    async fn save_processed(&self) -> Result<()> {
        let out = ProcessedFileOut {
            last_updated: Utc::now(),
            total_processed: self.processed.len(),
            videos: &self.processed,
        };
        let json = serde_json::to_string_pretty(&out)?;
        fs::write(self.state_dir.join(PROCESSED_FILE), json).await?;
        Ok(())
    }

    async fn save_failed(&self) -> Result<()> {
        let videos = self
            .failed
            .iter()
            .map(|record| {
                serde_json::to_string(&FailedEntry {
                    video_id: record.fingerprint.clone(),
                    reason: record.reason.clone(),
                    timestamp: record.failed_at,
                    error: record.raw_error.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let out = FailedFileOut {
            last_updated: Utc::now(),
            total_failed: videos.len(),
            videos,
        };
        let json = serde_json::to_string_pretty(&out)?;
        fs::write(self.state_dir.join(FAILED_FILE), json).await?;
        Ok(())
    }

    async fn save_cursor(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.cursor)?;
        fs::write(self.state_dir.join(CURSOR_FILE), json).await?;
        Ok(())
    }
}
