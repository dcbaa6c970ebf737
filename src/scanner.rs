use anyhow::Result;
use tracing::{debug, info};

use crate::fingerprint::fingerprint;
use crate::source::{Entity, MessageSource, VideoCandidate};
use crate::state::StateStore;

/// Pages through the video stream from the persisted cursor, skipping
/// already-resolved candidates.
pub struct BatchScanner {
    batch_size: usize,
}

impl BatchScanner {
    pub fn new(batch_size: usize) -> Self {
        Self { batch_size }
    }

    /// Find the oldest video-bearing message that is neither processed nor
    /// terminally failed.
    ///
    /// Fetches one page of `batch_size` messages starting at the cursor
    /// offset (0 means the very beginning of the stream). When a full page
    /// holds nothing unresolved, the cursor jumps past it and `None` means
    /// "nothing to do this run", not "stream exhausted"; the next run
    /// continues from the advanced offset. A short page never advances the
    /// cursor: the stream can still grow into those positions, and its
    /// resolved entries are re-skipped cheaply next run.
    pub async fn find_oldest_unresolved(
        &self,
        source: &dyn MessageSource,
        entity: &Entity,
        state: &mut StateStore,
    ) -> Result<Option<VideoCandidate>> {
        let offset = state.cursor().offset;
        let page = source
            .video_messages(entity, offset, self.batch_size)
            .await?;
        let page_len = page.len();

        debug!("Scanning {} candidates from offset {}", page_len, offset);

        for candidate in page {
            let fp = fingerprint(&candidate);

            if state.is_processed(&fp) {
                debug!("Skipping processed: {}", fp);
                continue;
            }
            if state.is_failed(&fp) {
                debug!("Skipping failed: {}", fp);
                continue;
            }

            info!(
                "🎯 Oldest unresolved candidate: message {} ({})",
                candidate.message_id, fp
            );
            return Ok(Some(candidate));
        }

        if page_len >= self.batch_size {
            let next = offset + self.batch_size as u64;
            info!(
                "📄 Batch exhausted with nothing unresolved, cursor {} -> {}",
                offset, next
            );
            state.advance_cursor(next).await?;
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::ReasonCategory;
    use crate::source::SourceMessage;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    struct FakeSource {
        messages: Vec<VideoCandidate>,
    }

    #[async_trait]
    impl MessageSource for FakeSource {
        async fn get_entity(&self, name: &str) -> Result<Entity> {
            Ok(Entity {
                id: 1,
                name: name.to_string(),
                title: None,
            })
        }

        async fn video_messages(
            &self,
            _entity: &Entity,
            offset: u64,
            limit: usize,
        ) -> Result<Vec<VideoCandidate>> {
            Ok(self
                .messages
                .iter()
                .skip(offset as usize)
                .take(limit)
                .cloned()
                .collect())
        }

        async fn messages_by_ids(
            &self,
            _entity: &Entity,
            _ids: &[i64],
        ) -> Result<Vec<SourceMessage>> {
            Ok(Vec::new())
        }

        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }
    }

    fn candidate(message_id: i64) -> VideoCandidate {
        VideoCandidate {
            peer_id: Some(1001),
            message_id,
            sender_id: Some(7),
            timestamp: Utc.timestamp_opt(1_700_000_000 + message_id, 0).unwrap(),
            video_byte_size: Some(1024),
            video_duration_seconds: Some(30.0),
            text: None,
        }
    }

    fn entity() -> Entity {
        Entity {
            id: 1,
            name: "channel".to_string(),
            title: None,
        }
    }

    #[tokio::test]
    async fn test_returns_first_unresolved() {
        let dir = TempDir::new().unwrap();
        let mut state = StateStore::open(dir.path()).await.unwrap();
        let source = FakeSource {
            messages: (1..=5).map(candidate).collect(),
        };

        state
            .mark_processed(&fingerprint(&candidate(1)))
            .await
            .unwrap();
        state
            .mark_failed(&fingerprint(&candidate(2)), ReasonCategory::Unknown, None)
            .await
            .unwrap();

        let scanner = BatchScanner::new(50);
        let found = scanner
            .find_oldest_unresolved(&source, &entity(), &mut state)
            .await
            .unwrap();

        assert_eq!(found.unwrap().message_id, 3);
    }

    #[tokio::test]
    async fn test_full_resolved_batch_advances_cursor() {
        let dir = TempDir::new().unwrap();
        let mut state = StateStore::open(dir.path()).await.unwrap();
        let messages: Vec<VideoCandidate> = (1..=50).map(candidate).collect();

        for m in &messages {
            state.mark_processed(&fingerprint(m)).await.unwrap();
        }

        let source = FakeSource { messages };
        let scanner = BatchScanner::new(50);
        let found = scanner
            .find_oldest_unresolved(&source, &entity(), &mut state)
            .await
            .unwrap();

        assert!(found.is_none());
        assert_eq!(state.cursor().offset, 50);
    }

    #[tokio::test]
    async fn test_short_resolved_page_leaves_cursor() {
        let dir = TempDir::new().unwrap();
        let mut state = StateStore::open(dir.path()).await.unwrap();
        let messages: Vec<VideoCandidate> = (1..=3).map(candidate).collect();

        for m in &messages {
            state.mark_processed(&fingerprint(m)).await.unwrap();
        }

        let source = FakeSource { messages };
        let scanner = BatchScanner::new(50);
        let found = scanner
            .find_oldest_unresolved(&source, &entity(), &mut state)
            .await
            .unwrap();

        assert!(found.is_none());
        assert_eq!(state.cursor().offset, 0);
    }

    #[tokio::test]
    async fn test_never_returns_resolved_candidates() {
        let dir = TempDir::new().unwrap();
        let mut state = StateStore::open(dir.path()).await.unwrap();
        let messages: Vec<VideoCandidate> = (1..=10).map(candidate).collect();

        for m in messages.iter().step_by(2) {
            state.mark_processed(&fingerprint(m)).await.unwrap();
        }

        let source = FakeSource { messages };
        let scanner = BatchScanner::new(50);
        let found = scanner
            .find_oldest_unresolved(&source, &entity(), &mut state)
            .await
            .unwrap()
            .unwrap();

        let fp = fingerprint(&found);
        assert!(!state.is_processed(&fp));
        assert!(!state.is_failed(&fp));
        assert_eq!(found.message_id, 2);
    }

    #[tokio::test]
    async fn test_empty_page_is_idle() {
        let dir = TempDir::new().unwrap();
        let mut state = StateStore::open(dir.path()).await.unwrap();
        let source = FakeSource { messages: vec![] };

        let scanner = BatchScanner::new(50);
        let found = scanner
            .find_oldest_unresolved(&source, &entity(), &mut state)
            .await
            .unwrap();

        assert!(found.is_none());
        assert_eq!(state.cursor().offset, 0);
    }
}
