//! Conversation compaction: estimate tokens, and when the history outgrows
//! its budget, summarize the older turns into a structured checkpoint that
//! replaces them, both in the runtime history and in the persisted session.

use keel_core::config::CompactionConfig;
use keel_sessions::{Role, SessionMessage, SessionStore};
use tracing::{debug, info};

use crate::provider::{ChatMessage, CompletionRequest, LlmProvider, ProviderError};

const SUMMARY_SYSTEM_PROMPT: &str = "You are a conversation summarizer. You produce dense, factual \
checkpoints of agent conversations. Keep every detail that would be needed to continue the work; \
drop pleasantries and dead ends.";

const CHECKPOINT_TEMPLATE: &str = "## Goal\n\n## Constraints\n\n## Progress\n### Done\n### In progress\n### Blocked\n\n## Key decisions\n\n## Next steps\n\n## Critical context";

/// Budget for the summarization reply itself.
const SUMMARY_MAX_TOKENS: u32 = 2048;

pub struct Compactor {
    cfg: CompactionConfig,
    model: String,
}

impl Compactor {
    pub fn new(cfg: CompactionConfig, model: String) -> Self {
        Self { cfg, model }
    }

    /// `ceil(serialized content bytes / 4)`, a deliberately cheap estimate.
    pub fn estimate_tokens(msg: &ChatMessage) -> u64 {
        let bytes = match msg {
            ChatMessage::User { text } => text.len(),
            ChatMessage::Assistant(reply) => serde_json::to_string(&reply.content)
                .map(|s| s.len())
                .unwrap_or(0),
            ChatMessage::ToolResult(result) => result.content.len(),
        };
        (bytes as u64).div_ceil(4)
    }

    pub fn total_tokens(messages: &[ChatMessage]) -> u64 {
        messages.iter().map(Self::estimate_tokens).sum()
    }

    pub fn should_compact(&self, messages: &[ChatMessage]) -> bool {
        let total = Self::total_tokens(messages);
        let limit = (self.cfg.max_tokens as f64 * self.cfg.threshold) as u64;
        total > limit
    }

    /// Index of the first message kept verbatim: walk from the tail
    /// accumulating until `keep_recent_tokens` is reached.
    fn cut_index(&self, messages: &[ChatMessage]) -> usize {
        let budget = self.cfg.keep_recent_tokens as u64;
        let mut acc = 0u64;
        let mut cut = messages.len();
        for (i, msg) in messages.iter().enumerate().rev() {
            acc += Self::estimate_tokens(msg);
            cut = i;
            if acc >= budget {
                break;
            }
        }
        cut
    }

    /// Summarize everything before the cut into a checkpoint and return the
    /// compacted message list: one synthetic user message followed by the
    /// kept tail, byte-for-byte unchanged and in order. The persisted
    /// session is rewritten atomically to match.
    pub async fn compact(
        &self,
        provider: &dyn LlmProvider,
        sessions: &SessionStore,
        session_key: &str,
        messages: Vec<ChatMessage>,
    ) -> Result<Vec<ChatMessage>, ProviderError> {
        let cut = self.cut_index(&messages);
        if cut <= 1 {
            debug!(session = %session_key, "compaction skipped: nothing worth summarizing");
            return Ok(messages);
        }

        let (older, kept) = messages.split_at(cut);
        let transcript = render_transcript(older);

        let request = CompletionRequest {
            model: self.model.clone(),
            system: SUMMARY_SYSTEM_PROMPT.to_string(),
            messages: vec![ChatMessage::user(format!(
                "Summarize the conversation below into a checkpoint using exactly this markdown \
                 template:\n\n{CHECKPOINT_TEMPLATE}\n\nConversation:\n\n{transcript}"
            ))],
            tools: Vec::new(),
            max_tokens: SUMMARY_MAX_TOKENS,
        };

        let reply = provider.complete(&request).await?;
        let summary = reply.text();

        let synthetic = ChatMessage::user(format!(
            "The conversation history before this point was compacted into the following \
             summary: <summary>{summary}</summary>"
        ));

        let mut compacted = Vec::with_capacity(kept.len() + 1);
        compacted.push(synthetic);
        compacted.extend_from_slice(kept);

        // Mirror the compacted shape into the session file.
        let records: Vec<SessionMessage> = compacted
            .iter()
            .filter_map(|msg| match msg {
                ChatMessage::User { text } => Some(SessionMessage::new(Role::User, text.clone())),
                ChatMessage::Assistant(reply) => {
                    Some(SessionMessage::new(Role::Assistant, reply.text()))
                }
                ChatMessage::ToolResult(_) => None,
            })
            .collect();
        if let Err(e) = sessions.rewrite(session_key, &records) {
            return Err(ProviderError::Unavailable(format!(
                "failed to rewrite compacted session: {e}"
            )));
        }

        info!(
            session = %session_key,
            summarized = older.len(),
            kept = kept.len(),
            "conversation compacted"
        );
        Ok(compacted)
    }
}

/// Role-prefixed plain-text transcript of the turns being summarized.
fn render_transcript(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|msg| match msg {
            ChatMessage::User { text } => format!("User: {text}"),
            ChatMessage::Assistant(reply) => format!("Assistant: {}", reply.text()),
            ChatMessage::ToolResult(result) => {
                format!("Tool result ({}): {}", result.tool_name, result.content)
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::mock::ScriptedProvider;

    fn compactor(keep_recent_tokens: u32) -> Compactor {
        Compactor::new(
            CompactionConfig {
                max_tokens: 1000,
                threshold: 0.8,
                keep_recent_tokens,
            },
            "test-model".to_string(),
        )
    }

    #[test]
    fn token_estimate_is_ceiling_of_quarter_bytes() {
        assert_eq!(
            Compactor::estimate_tokens(&ChatMessage::user("12345678")),
            2
        );
        assert_eq!(Compactor::estimate_tokens(&ChatMessage::user("123456789")), 3);
    }

    #[test]
    fn should_compact_only_past_threshold() {
        let c = compactor(100);
        // 1000 * 0.8 = 800 token limit; each message below is 250 tokens
        let small: Vec<ChatMessage> = (0..3).map(|_| ChatMessage::user("x".repeat(1000))).collect();
        assert!(!c.should_compact(&small));
        let big: Vec<ChatMessage> = (0..4).map(|_| ChatMessage::user("x".repeat(1000))).collect();
        assert!(c.should_compact(&big));
    }

    #[tokio::test]
    async fn compact_preserves_tail_and_prepends_summary() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sessions = SessionStore::new(dir.path());
        // 10 messages of 400 chars = 100 tokens each; keep_recent = 250
        // tokens, so the walk keeps the last 3 messages.
        let messages: Vec<ChatMessage> = (0..10)
            .map(|i| ChatMessage::user(format!("{i}{}", "x".repeat(399))))
            .collect();
        let tail = messages[7..].to_vec();

        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedProvider::text_reply(
            "the checkpoint",
        )]));
        let c = compactor(250);
        let compacted = c
            .compact(provider.as_ref(), &sessions, "c1", messages)
            .await
            .expect("compact");

        assert_eq!(compacted.len(), 4);
        match &compacted[0] {
            ChatMessage::User { text } => {
                assert!(text.contains("<summary>the checkpoint</summary>"));
            }
            other => panic!("expected synthetic user message, got {other:?}"),
        }
        assert_eq!(&compacted[1..], &tail[..]);

        // the session file was rewritten to the compacted shape
        let persisted = sessions.load("c1", 100).expect("load");
        assert_eq!(persisted.len(), 4);
        assert!(persisted[0].content.contains("<summary>"));
    }

    #[tokio::test]
    async fn compact_with_single_old_message_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sessions = SessionStore::new(dir.path());
        let messages = vec![
            ChatMessage::user("a".repeat(400)),
            ChatMessage::user("b".repeat(400)),
        ];

        // provider with no scripts: any call would error the test
        let provider = ScriptedProvider::new(Vec::new());
        let c = compactor(100);
        let out = c
            .compact(&provider, &sessions, "c2", messages.clone())
            .await
            .expect("compact");
        assert_eq!(out, messages);
        assert_eq!(provider.call_count(), 0);
        assert!(!sessions.exists("c2"));
    }
}
