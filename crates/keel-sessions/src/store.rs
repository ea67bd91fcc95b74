//! File-backed session store: `sessions/{key}.jsonl` under the workspace.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Result, SessionError};
use crate::types::{MessageMeta, Role, SessionMessage};

pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Store rooted at `{workspace}/sessions`.
    pub fn new(workspace: impl AsRef<Path>) -> Self {
        Self {
            dir: workspace.as_ref().join("sessions"),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.jsonl"))
    }

    fn io_err(key: &str, source: std::io::Error) -> SessionError {
        SessionError::Io {
            key: key.to_string(),
            source,
        }
    }

    /// Append one record. Creates the sessions directory on first use.
    /// Callers are serialized per key by the session supervisor.
    pub fn append(
        &self,
        key: &str,
        role: Role,
        content: &str,
        metadata: Option<MessageMeta>,
    ) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| Self::io_err(key, e))?;

        let mut record = SessionMessage::new(role, content);
        record.metadata = metadata;
        let line = serde_json::to_string(&record)?;

        let path = self.path_for(key);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Self::io_err(key, e))?;
        writeln!(file, "{line}").map_err(|e| Self::io_err(key, e))?;

        debug!(session = %key, role = ?role, bytes = content.len(), "session record appended");
        Ok(())
    }

    /// Load the last `max` records in insertion order.
    ///
    /// A missing file is an empty history, not an error. A malformed line is
    /// skipped with a warning; it never aborts the load.
    pub fn load(&self, key: &str, max: usize) -> Result<Vec<SessionMessage>> {
        let path = self.path_for(key);
        let raw = match std::fs::read_to_string(&path) {
            Ok(s) => s,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::io_err(key, e)),
        };

        let mut messages: Vec<SessionMessage> = Vec::new();
        for (n, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(line) {
                Ok(msg) => messages.push(msg),
                Err(e) => {
                    warn!(session = %key, line = n + 1, error = %e, "skipping malformed session line");
                }
            }
        }

        if messages.len() > max {
            messages.drain(..messages.len() - max);
        }
        Ok(messages)
    }

    /// Atomically replace a session's contents. Used only by compaction:
    /// writes to a temp file in the same directory, then renames over the
    /// original.
    pub fn rewrite(&self, key: &str, messages: &[SessionMessage]) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| Self::io_err(key, e))?;

        let mut tmp =
            tempfile::NamedTempFile::new_in(&self.dir).map_err(|e| Self::io_err(key, e))?;
        for msg in messages {
            let line = serde_json::to_string(msg)?;
            writeln!(tmp, "{line}").map_err(|e| Self::io_err(key, e))?;
        }

        tmp.persist(self.path_for(key))
            .map_err(|e| Self::io_err(key, e.error))?;

        debug!(session = %key, records = messages.len(), "session rewritten");
        Ok(())
    }

    /// True if a session file exists for `key`.
    pub fn exists(&self, key: &str) -> bool {
        self.path_for(key).exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SessionStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = SessionStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn load_of_missing_session_is_empty() {
        let (_dir, store) = store();
        assert!(store.load("nope", 10).expect("load").is_empty());
    }

    #[test]
    fn append_then_load_preserves_order_and_timestamps() {
        let (_dir, store) = store();
        store.append("c1", Role::User, "first", None).unwrap();
        store.append("c1", Role::Assistant, "second", None).unwrap();
        store.append("c1", Role::User, "third", None).unwrap();

        let messages = store.load("c1", 10).unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);

        for pair in messages.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[test]
    fn load_returns_only_the_tail() {
        let (_dir, store) = store();
        for i in 0..8 {
            store
                .append("c2", Role::User, &format!("msg {i}"), None)
                .unwrap();
        }
        let messages = store.load("c2", 3).unwrap();
        let contents: Vec<&str> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["msg 5", "msg 6", "msg 7"]);
    }

    #[test]
    fn malformed_line_is_skipped_not_fatal() {
        let (dir, store) = store();
        store.append("c3", Role::User, "good", None).unwrap();

        let path = dir.path().join("sessions").join("c3.jsonl");
        let mut raw = std::fs::read_to_string(&path).unwrap();
        raw.push_str("{ this is not json\n");
        std::fs::write(&path, raw).unwrap();
        store.append("c3", Role::Assistant, "also good", None).unwrap();

        let messages = store.load("c3", 10).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].content, "also good");
    }

    #[test]
    fn rewrite_replaces_contents_atomically() {
        let (_dir, store) = store();
        for i in 0..5 {
            store
                .append("c4", Role::User, &format!("old {i}"), None)
                .unwrap();
        }

        let replacement = vec![
            SessionMessage::new(Role::User, "summary"),
            SessionMessage::new(Role::Assistant, "kept"),
        ];
        store.rewrite("c4", &replacement).unwrap();

        let messages = store.load("c4", 100).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "summary");
        assert_eq!(messages[1].content, "kept");
    }

    #[test]
    fn metadata_round_trips() {
        let (_dir, store) = store();
        store
            .append(
                "c5",
                Role::Assistant,
                "done",
                Some(MessageMeta {
                    iterations: Some(3),
                    tool_calls: Some(2),
                }),
            )
            .unwrap();

        let messages = store.load("c5", 10).unwrap();
        let meta = messages[0].metadata.as_ref().expect("metadata");
        assert_eq!(meta.iterations, Some(3));
        assert_eq!(meta.tool_calls, Some(2));
    }
}
