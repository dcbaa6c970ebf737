pub mod chat;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use chat::ChatClient;

/// Configuration for the chat-completion backend used by caption ranking
/// and rewriting. The endpoint speaks the OpenAI chat-completions wire
/// format, which covers both local runtimes and hosted APIs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_seconds: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:1234/v1/chat/completions".to_string(),
            api_key: None,
            model: "local-model".to_string(),
            max_tokens: 256,
            temperature: 0.2,
            timeout_seconds: 60,
        }
    }
}

/// Chat message for LLM communication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// One-shot chat completion against the configured backend.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String>;
}
