use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::source::{Entity, MessageSource, VideoCandidate};

/// Where a context message sits relative to the candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPosition {
    Before,
    After,
}

/// One neighboring message, annotated for caption resolution.
#[derive(Debug, Clone)]
pub struct ContextMessage {
    pub message_id: i64,
    pub text: String,
    pub sender_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub position: WindowPosition,
    /// Absolute distance in seconds from the candidate's timestamp.
    pub delta_seconds: i64,
}

/// Gathers a bounded neighborhood of messages around a candidate video.
pub struct ContextWindowBuilder {
    radius: u32,
}

impl ContextWindowBuilder {
    pub fn new(radius: u32) -> Self {
        Self { radius }
    }

    /// Fetch up to `2 * radius` neighbors centered on the candidate's
    /// message id, excluding the candidate itself and empty-text messages,
    /// ordered by message id ascending.
    ///
    /// A fetch failure is non-fatal and yields an empty window.
    pub async fn build_window(
        &self,
        source: &dyn MessageSource,
        entity: &Entity,
        candidate: &VideoCandidate,
    ) -> Vec<ContextMessage> {
        let radius = i64::from(self.radius);
        let ids: Vec<i64> = (candidate.message_id - radius..=candidate.message_id + radius)
            .filter(|id| *id != candidate.message_id && *id > 0)
            .collect();

        if ids.is_empty() {
            return Vec::new();
        }

        let fetched = match source.messages_by_ids(entity, &ids).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(
                    "Context fetch failed around message {}: {}",
                    candidate.message_id, e
                );
                return Vec::new();
            }
        };

        let mut window: Vec<ContextMessage> = fetched
            .into_iter()
            .filter_map(|message| {
                if message.message_id == candidate.message_id {
                    return None;
                }
                let text = message.text.as_deref().unwrap_or("").trim().to_string();
                if text.is_empty() {
                    return None;
                }

                let position = if message.message_id < candidate.message_id {
                    WindowPosition::Before
                } else {
                    WindowPosition::After
                };

                Some(ContextMessage {
                    message_id: message.message_id,
                    text,
                    sender_id: message.sender_id,
                    timestamp: message.timestamp,
                    position,
                    delta_seconds: (message.timestamp - candidate.timestamp)
                        .num_seconds()
                        .abs(),
                })
            })
            .collect();

        window.sort_by_key(|m| m.message_id);

        debug!(
            "Context window for message {}: {} of {} neighbors usable",
            candidate.message_id,
            window.len(),
            ids.len()
        );
        window
    }
}
