use anyhow::{anyhow, Result};
use tracing::{debug, warn};

use crate::context::{ContextMessage, WindowPosition};
use crate::llm::{ChatCompletion, ChatMessage};
use crate::source::VideoCandidate;

const NONE_SENTINEL: &str = "none";

const RANKING_INSTRUCTIONS: &str = "You match a just-posted video to the chat message most likely \
to be its caption. The user lists candidate messages with their position relative to the video \
and their distance in seconds. Reply with the verbatim text of exactly one candidate message, \
or NONE if none of them describes the video. No commentary, no quotes.";

/// Selects the best caption for a candidate from its context window.
///
/// Ordered strategy chain, first hit wins: the candidate's own text, an
/// AI-ranked window entry, a same-sender-nearby heuristic, then the empty
/// string. The resolver never invents content; substituting a default
/// display caption for an empty result is the caller's job.
pub struct CaptionResolver {
    ranker: Box<dyn ChatCompletion>,
    sender_window_seconds: i64,
}

enum RankSelection {
    /// The ranker affirmatively judged no window entry relevant.
    Declined,
    Text(String),
}

impl CaptionResolver {
    pub fn new(ranker: Box<dyn ChatCompletion>, sender_window_seconds: i64) -> Self {
        Self {
            ranker,
            sender_window_seconds,
        }
    }

    pub async fn resolve(&self, candidate: &VideoCandidate, window: &[ContextMessage]) -> String {
        // Own text wins outright; the window is not consulted.
        if let Some(text) = candidate.text.as_deref() {
            let text = text.trim();
            if !text.is_empty() {
                debug!("Candidate message {} carries its own caption", candidate.message_id);
                return text.to_string();
            }
        }

        if window.is_empty() {
            return String::new();
        }

        match self.rank(candidate, window).await {
            Ok(RankSelection::Text(text)) => return text,
            Ok(RankSelection::Declined) => {
                debug!("Ranker declined: no window entry describes the video");
                return String::new();
            }
            Err(e) => warn!("Caption ranking failed: {} (using heuristic fallback)", e),
        }

        if let Some(entry) = self.same_sender_nearby(candidate, window) {
            debug!("Heuristic fallback selected message {}", entry.message_id);
            return entry.text.clone();
        }

        String::new()
    }

    async fn rank(
        &self,
        candidate: &VideoCandidate,
        window: &[ContextMessage],
    ) -> Result<RankSelection> {
        let reply = self
            .ranker
            .complete(vec![
                ChatMessage::system(RANKING_INSTRUCTIONS),
                ChatMessage::user(ranking_prompt(candidate, window)),
            ])
            .await?;

        let reply = strip_symmetric_quotes(reply.trim());

        if reply.eq_ignore_ascii_case(NONE_SENTINEL) {
            return Ok(RankSelection::Declined);
        }

        match match_window_entry(reply, window) {
            Some(entry) => Ok(RankSelection::Text(entry.text.clone())),
            None => Err(anyhow!("ranker reply matches no window entry: {:?}", reply)),
        }
    }

    fn same_sender_nearby<'a>(
        &self,
        candidate: &VideoCandidate,
        window: &'a [ContextMessage],
    ) -> Option<&'a ContextMessage> {
        let sender = candidate.sender_id?;
        window.iter().find(|entry| {
            entry.sender_id == Some(sender) && entry.delta_seconds < self.sender_window_seconds
        })
    }
}

fn ranking_prompt(candidate: &VideoCandidate, window: &[ContextMessage]) -> String {
    let mut prompt = format!(
        "Video posted at {}.\nCandidate messages:\n",
        candidate.timestamp.to_rfc3339()
    );
    for entry in window {
        let position = match entry.position {
            WindowPosition::Before => "before",
            WindowPosition::After => "after",
        };
        prompt.push_str(&format!(
            "- [{} the video, {}s away] {}\n",
            position, entry.delta_seconds, entry.text
        ));
    }
    prompt.push_str("\nReply with the exact text of the single most relevant message, or NONE.");
    prompt
}

/// Strip one pair of matching quote characters wrapping the whole reply.
fn strip_symmetric_quotes(reply: &str) -> &str {
    const PAIRS: [(char, char); 4] = [('"', '"'), ('\'', '\''), ('\u{201c}', '\u{201d}'), ('«', '»')];

    let (first, last) = match (reply.chars().next(), reply.chars().next_back()) {
        (Some(first), Some(last)) => (first, last),
        _ => return reply,
    };

    if reply.chars().count() < 2 {
        return reply;
    }

    for (open, close) in PAIRS {
        if first == open && last == close {
            return reply[first.len_utf8()..reply.len() - last.len_utf8()].trim();
        }
    }
    reply
}

/// Accept the reply only if it matches a window entry exactly or by
/// substring containment in either direction.
fn match_window_entry<'a>(reply: &str, window: &'a [ContextMessage]) -> Option<&'a ContextMessage> {
    if reply.is_empty() {
        return None;
    }
    window
        .iter()
        .find(|entry| entry.text.contains(reply) || reply.contains(&entry.text))
}
