//! Write-ahead log of completed substep outputs, one JSONL file per run.
//!
//! Each line is `{"step": "<name>:<index>", "output": <json>}`. A run retried
//! after a crash reopens its journal and replays recorded outputs instead of
//! re-executing the substeps that produced them.

use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, RuntimeError};

#[derive(Debug, Serialize, Deserialize)]
struct JournalRecord {
    step: String,
    output: serde_json::Value,
}

/// Journal of one run's completed substeps.
///
/// Thread-safe: the in-memory index and the append handle are both behind
/// mutexes so a shared `StepContext` can record from any task.
pub struct RunJournal {
    path: PathBuf,
    entries: Mutex<HashMap<String, serde_json::Value>>,
}

impl RunJournal {
    /// Open (or create) the journal for `run_id` under `runs_dir`,
    /// loading any substep outputs recorded by earlier attempts.
    pub fn open(runs_dir: &Path, run_id: &str) -> Result<Self> {
        std::fs::create_dir_all(runs_dir)?;
        let path = runs_dir.join(format!("{run_id}.jsonl"));

        let mut entries = HashMap::new();
        if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            for line in raw.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<JournalRecord>(line) {
                    Ok(rec) => {
                        entries.insert(rec.step, rec.output);
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping malformed journal line");
                    }
                }
            }
            debug!(run = run_id, steps = entries.len(), "journal reopened");
        }

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Return the recorded output for an indexed step name, if any.
    pub fn lookup(&self, step: &str) -> Option<serde_json::Value> {
        self.entries.lock().unwrap().get(step).cloned()
    }

    /// Record a completed substep: append to the WAL, then index in memory.
    pub fn record(&self, step: &str, output: serde_json::Value) -> Result<()> {
        let line = serde_json::to_string(&JournalRecord {
            step: step.to_string(),
            output: output.clone(),
        })?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| RuntimeError::Journal(format!("{}: {e}", self.path.display())))?;
        writeln!(file, "{line}").map_err(|e| RuntimeError::Journal(e.to_string()))?;

        self.entries
            .lock()
            .unwrap()
            .insert(step.to_string(), output);
        Ok(())
    }

    /// Number of recorded substeps.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count recorded substeps whose base name matches `base` (any index).
    pub fn count_base(&self, base: &str) -> usize {
        let prefix = format!("{base}:");
        self.entries
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_then_reopen_replays() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = RunJournal::open(dir.path(), "run-1").expect("open");
        journal
            .record("think:0", serde_json::json!({"text": "hi"}))
            .expect("record");
        journal
            .record("tool:read:0", serde_json::json!("contents"))
            .expect("record");

        let reopened = RunJournal::open(dir.path(), "run-1").expect("reopen");
        assert_eq!(reopened.len(), 2);
        assert_eq!(
            reopened.lookup("think:0"),
            Some(serde_json::json!({"text": "hi"}))
        );
        assert_eq!(reopened.lookup("think:1"), None);
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("run-2.jsonl");
        std::fs::write(
            &path,
            "{\"step\":\"think:0\",\"output\":\"ok\"}\nnot json at all\n",
        )
        .expect("write");

        let journal = RunJournal::open(dir.path(), "run-2").expect("open");
        assert_eq!(journal.len(), 1);
        assert_eq!(journal.lookup("think:0"), Some(serde_json::json!("ok")));
    }

    #[test]
    fn count_base_matches_indexed_names_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let journal = RunJournal::open(dir.path(), "run-3").expect("open");
        journal.record("think:0", serde_json::json!(1)).unwrap();
        journal.record("think:1", serde_json::json!(2)).unwrap();
        journal.record("tool:read:0", serde_json::json!(3)).unwrap();
        assert_eq!(journal.count_base("think"), 2);
        assert_eq!(journal.count_base("tool:read"), 1);
    }
}
