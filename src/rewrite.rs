use tracing::{debug, warn};

use crate::llm::{ChatCompletion, ChatMessage};

const REWRITE_INSTRUCTIONS: &str = "You polish captions for short video posts. Rewrite the \
caption to be engaging and concise while keeping its meaning and language. Reply with the \
rewritten caption only, no quotes, no commentary.";

/// Rewrites a resolved caption for posting. Strictly best-effort: any
/// failure hands back the input unchanged.
pub struct CaptionRewriter {
    llm: Box<dyn ChatCompletion>,
}

impl CaptionRewriter {
    pub fn new(llm: Box<dyn ChatCompletion>) -> Self {
        Self { llm }
    }

    pub async fn rewrite(&self, caption: &str) -> String {
        if caption.trim().is_empty() {
            return caption.to_string();
        }

        let messages = vec![
            ChatMessage::system(REWRITE_INSTRUCTIONS),
            ChatMessage::user(caption),
        ];

        match self.llm.complete(messages).await {
            Ok(reply) => {
                let reply = reply.trim();
                if reply.is_empty() {
                    warn!("Rewrite returned empty text, keeping original caption");
                    caption.to_string()
                } else {
                    debug!("Caption rewritten ({} -> {} chars)", caption.len(), reply.len());
                    reply.to_string()
                }
            }
            Err(e) => {
                warn!("Caption rewrite failed: {} (keeping original)", e);
                caption.to_string()
            }
        }
    }
}
