/// Video Relay
///
/// Incrementally scans an append-only channel stream for the oldest video
/// not yet published, resolves a caption from nearby messages, and hands
/// the result to a publish endpoint. One video per run; cron supplies the
/// cadence.

pub mod caption;
pub mod config;
pub mod context;
pub mod failure;
pub mod fingerprint;
pub mod llm;
pub mod media;
pub mod pipeline;
pub mod publish;
pub mod rewrite;
pub mod scanner;
pub mod source;
pub mod state;

// Re-export main types for easy access
pub use crate::caption::CaptionResolver;
pub use crate::config::Config;
pub use crate::context::{ContextMessage, ContextWindowBuilder, WindowPosition};
pub use crate::failure::{classify, ReasonCategory};
pub use crate::fingerprint::fingerprint;
pub use crate::llm::{ChatClient, ChatCompletion, ChatMessage, LlmConfig};
pub use crate::media::{HttpMediaFetcher, MediaFetcher, TempMedia};
pub use crate::pipeline::{Pipeline, RunOutcome};
pub use crate::publish::{truncate_caption, HttpPublisher, PublishError, Publisher};
pub use crate::rewrite::CaptionRewriter;
pub use crate::scanner::BatchScanner;
pub use crate::source::{Entity, HttpMessageSource, MessageSource, SourceMessage, VideoCandidate};
pub use crate::state::{CursorState, FailedRecord, StateStore};
