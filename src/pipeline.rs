use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::caption::CaptionResolver;
use crate::config::Config;
use crate::context::ContextWindowBuilder;
use crate::failure::{classify, ReasonCategory};
use crate::fingerprint::fingerprint;
use crate::media::MediaFetcher;
use crate::publish::{truncate_caption, PublishError, Publisher};
use crate::rewrite::CaptionRewriter;
use crate::scanner::BatchScanner;
use crate::source::MessageSource;
use crate::state::StateStore;

/// What a single run accomplished.
#[derive(Debug)]
pub enum RunOutcome {
    /// No unresolved candidate this run.
    Idle,
    Published {
        fingerprint: String,
        post_id: String,
    },
    Failed {
        fingerprint: String,
        reason: ReasonCategory,
    },
}

/// Sequential run-once orchestration: scan, resolve a caption, download,
/// publish, record the outcome. Processes at most one video per run; cron
/// provides the cadence.
pub struct Pipeline {
    config: Config,
    source: Box<dyn MessageSource>,
    scanner: BatchScanner,
    window_builder: ContextWindowBuilder,
    resolver: CaptionResolver,
    rewriter: Option<CaptionRewriter>,
    fetcher: Box<dyn MediaFetcher>,
    publisher: Box<dyn Publisher>,
}

impl Pipeline {
    pub fn new(
        config: Config,
        source: Box<dyn MessageSource>,
        resolver: CaptionResolver,
        rewriter: Option<CaptionRewriter>,
        fetcher: Box<dyn MediaFetcher>,
        publisher: Box<dyn Publisher>,
    ) -> Self {
        let scanner = BatchScanner::new(config.scan.batch_size);
        let window_builder = ContextWindowBuilder::new(config.scan.context_radius);

        Self {
            config,
            source,
            scanner,
            window_builder,
            resolver,
            rewriter,
            fetcher,
            publisher,
        }
    }

    /// Process at most one video. Failing to resolve the channel is the one
    /// hard error here; everything after that either recovers locally or is
    /// recorded as a terminal per-video failure.
    pub async fn run_once(&self, state: &mut StateStore) -> Result<RunOutcome> {
        let entity = self
            .source
            .get_entity(&self.config.source.channel)
            .await
            .with_context(|| {
                format!("cannot resolve channel {}", self.config.source.channel)
            })?;

        let candidate = match self
            .scanner
            .find_oldest_unresolved(self.source.as_ref(), &entity, state)
            .await
        {
            Ok(Some(candidate)) => candidate,
            Ok(None) => {
                info!("💤 No unresolved videos this run");
                return Ok(RunOutcome::Idle);
            }
            Err(e) => {
                warn!("Scan failed: {} (nothing processed this run)", e);
                return Ok(RunOutcome::Idle);
            }
        };

        let fp = fingerprint(&candidate);

        let window = self
            .window_builder
            .build_window(self.source.as_ref(), &entity, &candidate)
            .await;

        let mut caption = self.resolver.resolve(&candidate, &window).await;
        if caption.is_empty() {
            info!("No caption resolved, using default");
            caption = self.config.caption.default_caption.clone();
        }

        if let Some(rewriter) = &self.rewriter {
            caption = rewriter.rewrite(&caption).await;
        }
        let caption = truncate_caption(&caption, self.config.caption.max_length);

        let media = match self.fetcher.fetch(&entity, candidate.message_id).await {
            Ok(media) => media,
            Err(e) => return self.record_failure(state, &fp, e, "Download").await,
        };

        match self.publisher.publish(media.path(), &caption).await {
            Ok(post_id) => {
                state.mark_processed(&fp).await?;
                info!(
                    "✅ Published message {} as post {}",
                    candidate.message_id, post_id
                );
                Ok(RunOutcome::Published {
                    fingerprint: fp,
                    post_id,
                })
            }
            Err(e) => self.record_failure(state, &fp, e, "Publish").await,
        }
    }

    async fn record_failure(
        &self,
        state: &mut StateStore,
        fingerprint: &str,
        error: PublishError,
        stage: &str,
    ) -> Result<RunOutcome> {
        let reason = classify(&error);
        error!("❌ {} failed for {} ({}): {}", stage, fingerprint, reason, error);

        state
            .mark_failed(fingerprint, reason, Some(error.message.clone()))
            .await?;

        Ok(RunOutcome::Failed {
            fingerprint: fingerprint.to_string(),
            reason,
        })
    }

    /// Best-effort disconnect from the message source.
    pub async fn shutdown(&self) {
        if let Err(e) = self.source.disconnect().await {
            warn!("Disconnect from source failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatCompletion, ChatMessage};
    use crate::media::TempMedia;
    use crate::source::{Entity, SourceMessage, VideoCandidate};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use tempfile::{NamedTempFile, TempDir};

    struct FakeSource {
        videos: Vec<VideoCandidate>,
        context: Vec<SourceMessage>,
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
                .videos
                .iter()
                .skip(offset as usize)
                .take(limit)
                .cloned()
                .collect())
        }

        async fn messages_by_ids(
            &self,
            _entity: &Entity,
            ids: &[i64],
        ) -> Result<Vec<SourceMessage>> {
            Ok(self
                .context
                .iter()
                .filter(|m| ids.contains(&m.message_id))
                .cloned()
                .collect())
        }

        async fn disconnect(&self) -> Result<()> {
            Ok(())
        }
    }

    struct FailingRanker;

    #[async_trait]
    impl ChatCompletion for FailingRanker {
        async fn complete(&self, _messages: Vec<ChatMessage>) -> Result<String> {
            Err(anyhow!("ranking endpoint unreachable"))
        }
    }

    struct FakeFetcher {
        fail_with: Option<PublishError>,
    }

    #[async_trait]
    impl MediaFetcher for FakeFetcher {
        async fn fetch(
            &self,
            _entity: &Entity,
            _message_id: i64,
        ) -> Result<TempMedia, PublishError> {
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            Ok(TempMedia::new(NamedTempFile::new().unwrap()))
        }
    }

    struct FakePublisher {
        fail_with: Option<PublishError>,
        captions: Arc<Mutex<Vec<String>>>,
    }

    impl FakePublisher {
        fn succeeding() -> Self {
            Self {
                fail_with: None,
                captions: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn failing(error: PublishError) -> Self {
            Self {
                fail_with: Some(error),
                captions: Arc::new(Mutex::new(Vec::new())),
            }
        }
    }

    #[async_trait]
    impl Publisher for FakePublisher {
        async fn publish(&self, _media: &Path, caption: &str) -> Result<String, PublishError> {
            self.captions.lock().unwrap().push(caption.to_string());
            match &self.fail_with {
                Some(err) => Err(err.clone()),
                None => Ok("post-1".to_string()),
            }
        }
    }

    fn candidate(message_id: i64, text: Option<&str>) -> VideoCandidate {
        VideoCandidate {
            peer_id: Some(1001),
            message_id,
            sender_id: Some(7),
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            video_byte_size: Some(1024),
            video_duration_seconds: Some(30.0),
            text: text.map(|t| t.to_string()),
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.source.channel = "test_channel".to_string();
        config
    }

    fn pipeline(
        source: FakeSource,
        fetcher: FakeFetcher,
        publisher: FakePublisher,
    ) -> (Pipeline, Arc<Mutex<Vec<String>>>) {
        let captions = publisher.captions.clone();
        let resolver = CaptionResolver::new(Box::new(FailingRanker), 300);
        let pipeline = Pipeline::new(
            test_config(),
            Box::new(source),
            resolver,
            None,
            Box::new(fetcher),
            Box::new(publisher),
        );
        (pipeline, captions)
    }

    #[tokio::test]
    async fn test_publish_success_marks_processed() {
        let dir = TempDir::new().unwrap();
        let mut state = StateStore::open(dir.path()).await.unwrap();

        let source = FakeSource {
            videos: vec![candidate(10, Some("hello"))],
            context: Vec::new(),
        };
        let (pipeline, captions) = pipeline(
            source,
            FakeFetcher { fail_with: None },
            FakePublisher::succeeding(),
        );

        let outcome = pipeline.run_once(&mut state).await.unwrap();

        match outcome {
            RunOutcome::Published {
                fingerprint,
                post_id,
            } => {
                assert_eq!(post_id, "post-1");
                assert!(state.is_processed(&fingerprint));
            }
            other => panic!("expected Published, got {:?}", other),
        }
        assert_eq!(captions.lock().unwrap().as_slice(), ["hello"]);
    }

    #[tokio::test]
    async fn test_publish_failure_is_terminal() {
        let dir = TempDir::new().unwrap();
        let mut state = StateStore::open(dir.path()).await.unwrap();

        let source = FakeSource {
            videos: vec![candidate(10, Some("hello"))],
            context: Vec::new(),
        };
        let (pipeline, _) = pipeline(
            source,
            FakeFetcher { fail_with: None },
            FakePublisher::failing(PublishError::new(
                Some(400),
                "video longer than 140 seconds",
            )),
        );

        let outcome = pipeline.run_once(&mut state).await.unwrap();

        match outcome {
            RunOutcome::Failed {
                fingerprint,
                reason,
            } => {
                assert_eq!(reason, ReasonCategory::DurationExceeded);
                assert!(state.is_failed(&fingerprint));
                assert_eq!(state.failed_records()[0].reason, "duration_exceeded");
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_candidate_not_retried_next_run() {
        let dir = TempDir::new().unwrap();
        let mut state = StateStore::open(dir.path()).await.unwrap();

        let source = || FakeSource {
            videos: vec![candidate(10, Some("hello"))],
            context: Vec::new(),
        };

        let (first, _) = pipeline(
            source(),
            FakeFetcher { fail_with: None },
            FakePublisher::failing(PublishError::new(Some(500), "flaky backend")),
        );
        first.run_once(&mut state).await.unwrap();

        let (second, captions) = pipeline(
            source(),
            FakeFetcher { fail_with: None },
            FakePublisher::succeeding(),
        );
        let outcome = second.run_once(&mut state).await.unwrap();

        assert!(matches!(outcome, RunOutcome::Idle));
        assert!(captions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_download_failure_is_classified() {
        let dir = TempDir::new().unwrap();
        let mut state = StateStore::open(dir.path()).await.unwrap();

        let source = FakeSource {
            videos: vec![candidate(10, Some("hello"))],
            context: Vec::new(),
        };
        let (pipeline, captions) = pipeline(
            source,
            FakeFetcher {
                fail_with: Some(PublishError::new(Some(403), "forbidden")),
            },
            FakePublisher::succeeding(),
        );

        let outcome = pipeline.run_once(&mut state).await.unwrap();

        match outcome {
            RunOutcome::Failed { reason, .. } => {
                assert_eq!(reason, ReasonCategory::Forbidden)
            }
            other => panic!("expected Failed, got {:?}", other),
        }
        assert!(captions.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_default_caption_when_resolution_empty() {
        let dir = TempDir::new().unwrap();
        let mut state = StateStore::open(dir.path()).await.unwrap();

        // No own text, no usable context, ranker down: default kicks in.
        let source = FakeSource {
            videos: vec![candidate(10, None)],
            context: Vec::new(),
        };
        let (pipeline, captions) = pipeline(
            source,
            FakeFetcher { fail_with: None },
            FakePublisher::succeeding(),
        );

        pipeline.run_once(&mut state).await.unwrap();
        assert_eq!(captions.lock().unwrap().as_slice(), ["New video"]);
    }

    #[tokio::test]
    async fn test_fallback_caption_from_context() {
        let dir = TempDir::new().unwrap();
        let mut state = StateStore::open(dir.path()).await.unwrap();

        let source = FakeSource {
            videos: vec![candidate(10, None)],
            context: vec![SourceMessage {
                message_id: 9,
                sender_id: Some(7),
                timestamp: Utc.timestamp_opt(1_700_000_000 - 10, 0).unwrap(),
                text: Some("look at this".to_string()),
            }],
        };
        let (pipeline, captions) = pipeline(
            source,
            FakeFetcher { fail_with: None },
            FakePublisher::succeeding(),
        );

        pipeline.run_once(&mut state).await.unwrap();
        assert_eq!(captions.lock().unwrap().as_slice(), ["look at this"]);
    }
}
