//! Context assembly: the system prompt from workspace identity/memory files
//! and the conversation history from the session store.

use std::sync::Arc;

use chrono::{Duration, Utc};
use keel_memory::MemoryStore;
use keel_sessions::{Role, SessionStore};
use tracing::debug;

use crate::provider::ChatMessage;

/// Fixed behavioral guidelines appended to every system prompt.
const GUIDELINES: &str = "## Guidelines\n\
- Use tools when you need facts, files, or command output; never guess at workspace state.\n\
- Prefer one tool call at a time and read its result before the next step.\n\
- Use the remember tool for things worth keeping beyond this conversation.\n\
- When you are done, reply with plain text. Your text reply ends the turn.";

pub struct ContextAssembler {
    memory: Arc<MemoryStore>,
    sessions: Arc<SessionStore>,
    agent_name: String,
}

impl ContextAssembler {
    pub fn new(memory: Arc<MemoryStore>, sessions: Arc<SessionStore>, agent_name: String) -> Self {
        Self {
            memory,
            sessions,
            agent_name,
        }
    }

    /// Compose the system prompt: identity, then user info, then the memory
    /// block, then fixed guidelines. Absent optional files are skipped.
    pub fn build_system_prompt(&self) -> String {
        let mut sections: Vec<String> = Vec::new();

        match self.memory.read_optional("SOUL.md") {
            Some(soul) => sections.push(soul.trim_end().to_string()),
            None => sections.push(format!(
                "You are {}, a persistent personal agent. You keep working memory in \
                 your workspace and carry context across conversations.",
                self.agent_name
            )),
        }

        if let Some(user) = self.memory.read_optional("USER.md") {
            sections.push(format!("## User\n\n{}", user.trim_end()));
        }

        if let Some(block) = self.memory_block() {
            sections.push(block);
        }

        sections.push(GUIDELINES.to_string());

        let prompt = sections.join("\n\n");
        debug!(chars = prompt.len(), "system prompt assembled");
        prompt
    }

    /// Curated memory plus yesterday's and today's daily logs, when present.
    fn memory_block(&self) -> Option<String> {
        let mut parts: Vec<String> = Vec::new();

        if let Some(curated) = self.memory.read_curated() {
            let body = MemoryStore::strip_heartbeat(&curated);
            if !body.trim().is_empty() {
                parts.push(body.trim_end().to_string());
            }
        }

        let today = Utc::now().date_naive();
        if let Some(log) = self.memory.read_day(today - Duration::days(1)) {
            parts.push(format!("### Yesterday's log\n\n{}", log.trim_end()));
        }
        if let Some(log) = self.memory.read_day(today) {
            parts.push(format!("### Today's log\n\n{}", log.trim_end()));
        }

        if parts.is_empty() {
            None
        } else {
            Some(format!("## Memory\n\n{}", parts.join("\n\n")))
        }
    }

    /// Load the last `max` persisted turns as runtime messages.
    ///
    /// Only user and assistant records are replayed; tool results live and
    /// die inside the run that produced them.
    pub fn build_history(&self, session_key: &str, max: usize) -> Vec<ChatMessage> {
        let records = self.sessions.load(session_key, max).unwrap_or_default();
        records
            .into_iter()
            .filter_map(|rec| match rec.role {
                Role::User => Some(ChatMessage::user(rec.content)),
                Role::Assistant => Some(ChatMessage::assistant_text(rec.content)),
                Role::ToolResult => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler(dir: &std::path::Path) -> ContextAssembler {
        ContextAssembler::new(
            Arc::new(MemoryStore::new(dir)),
            Arc::new(SessionStore::new(dir)),
            "Keel".to_string(),
        )
    }

    #[test]
    fn default_identity_references_agent_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let prompt = assembler(dir.path()).build_system_prompt();
        assert!(prompt.contains("You are Keel"));
        assert!(prompt.contains("ends the turn"));
        assert!(!prompt.contains("## Memory"));
    }

    #[test]
    fn soul_file_replaces_default_identity() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("SOUL.md"), "You are a grumpy lighthouse keeper.")
            .unwrap();
        let prompt = assembler(dir.path()).build_system_prompt();
        assert!(prompt.starts_with("You are a grumpy lighthouse keeper."));
        assert!(!prompt.contains("You are Keel"));
    }

    #[test]
    fn memory_block_includes_curated_and_logs_without_marker() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = MemoryStore::new(dir.path());
        store
            .write_curated(&MemoryStore::with_heartbeat("- user prefers short answers", Utc::now()))
            .unwrap();
        store.append_today("shipped the release").unwrap();

        let prompt = assembler(dir.path()).build_system_prompt();
        assert!(prompt.contains("user prefers short answers"));
        assert!(prompt.contains("### Today's log"));
        assert!(!prompt.contains("last_heartbeat"));
    }

    #[test]
    fn history_drops_tool_result_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sessions = SessionStore::new(dir.path());
        sessions.append("c1", Role::User, "hi", None).unwrap();
        sessions
            .append("c1", Role::ToolResult, "raw tool output", None)
            .unwrap();
        sessions.append("c1", Role::Assistant, "hello", None).unwrap();

        let history = assembler(dir.path()).build_history("c1", 10);
        assert_eq!(history.len(), 2);
        assert!(matches!(history[0], ChatMessage::User { .. }));
        assert!(matches!(history[1], ChatMessage::Assistant(_)));
    }
}
