//! Markdown memory store.
//!
//! Layout under the workspace root:
//!
//! ```text
//! MEMORY.md            curated long-term memory (may carry a
//!                      `last_heartbeat: <RFC3339>` marker line)
//! SOUL.md, USER.md     optional static identity/context files
//! memory/YYYY-MM-DD.md per-day append-only logs with `### HH:MM:SS` headers
//! ```

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::error::{MemoryError, Result};

const MARKER_PREFIX: &str = "last_heartbeat:";

pub struct MemoryStore {
    root: PathBuf,
}

impl MemoryStore {
    pub fn new(workspace: impl AsRef<Path>) -> Self {
        Self {
            root: workspace.as_ref().to_path_buf(),
        }
    }

    fn io_err(path: &Path, source: std::io::Error) -> MemoryError {
        MemoryError::Io {
            path: path.display().to_string(),
            source,
        }
    }

    fn logs_dir(&self) -> PathBuf {
        self.root.join("memory")
    }

    fn log_path(&self, date: NaiveDate) -> PathBuf {
        self.logs_dir()
            .join(format!("{}.md", date.format("%Y-%m-%d")))
    }

    // ── identity files ──────────────────────────────────────────────────────

    /// Read an optional workspace file (`SOUL.md`, `USER.md`). Absent → None.
    pub fn read_optional(&self, name: &str) -> Option<String> {
        let path = self.root.join(name);
        match std::fs::read_to_string(&path) {
            Ok(s) if !s.trim().is_empty() => Some(s),
            Ok(_) => None,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read workspace file");
                None
            }
        }
    }

    // ── curated memory ──────────────────────────────────────────────────────

    /// Read `MEMORY.md`. Absent → None; a read never creates the file.
    pub fn read_curated(&self) -> Option<String> {
        self.read_optional("MEMORY.md")
    }

    /// Atomically replace `MEMORY.md`.
    pub fn write_curated(&self, content: &str) -> Result<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| Self::io_err(&self.root, e))?;
        let path = self.root.join("MEMORY.md");
        let mut tmp =
            tempfile::NamedTempFile::new_in(&self.root).map_err(|e| Self::io_err(&path, e))?;
        tmp.write_all(content.as_bytes())
            .map_err(|e| Self::io_err(&path, e))?;
        tmp.persist(&path).map_err(|e| Self::io_err(&path, e.error))?;
        debug!(bytes = content.len(), "curated memory rewritten");
        Ok(())
    }

    // ── heartbeat marker ────────────────────────────────────────────────────

    /// Parse the `last_heartbeat:` marker out of curated memory content.
    pub fn parse_heartbeat(content: &str) -> Option<DateTime<Utc>> {
        content.lines().find_map(|line| {
            let rest = line.trim().strip_prefix(MARKER_PREFIX)?;
            DateTime::parse_from_rfc3339(rest.trim())
                .ok()
                .map(|dt| dt.with_timezone(&Utc))
        })
    }

    /// Remove any marker lines. Idempotent: stripping twice equals stripping
    /// once.
    pub fn strip_heartbeat(content: &str) -> String {
        let stripped: Vec<&str> = content
            .lines()
            .filter(|line| !line.trim().starts_with(MARKER_PREFIX))
            .collect();
        let mut out = stripped.join("\n");
        if content.ends_with('\n') && !out.ends_with('\n') {
            out.push('\n');
        }
        out
    }

    /// Return `content` with exactly one fresh marker line appended.
    pub fn with_heartbeat(content: &str, at: DateTime<Utc>) -> String {
        let body = Self::strip_heartbeat(content);
        let sep = if body.is_empty() || body.ends_with('\n') {
            ""
        } else {
            "\n"
        };
        format!("{body}{sep}\n{MARKER_PREFIX} {}\n", at.to_rfc3339())
    }

    // ── daily logs ──────────────────────────────────────────────────────────

    /// Read the log for a specific day. Absent → None.
    pub fn read_day(&self, date: NaiveDate) -> Option<String> {
        let path = self.log_path(date);
        match std::fs::read_to_string(&path) {
            Ok(s) if !s.trim().is_empty() => Some(s),
            _ => None,
        }
    }

    /// Append a timestamped entry to today's log, creating the `memory/`
    /// directory and the day file as needed.
    pub fn append_today(&self, note: &str) -> Result<()> {
        let now = Utc::now();
        let dir = self.logs_dir();
        std::fs::create_dir_all(&dir).map_err(|e| Self::io_err(&dir, e))?;

        let path = self.log_path(now.date_naive());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Self::io_err(&path, e))?;
        write!(file, "### {}\n{}\n\n", now.format("%H:%M:%S"), note.trim_end())
            .map_err(|e| Self::io_err(&path, e))?;

        debug!(date = %now.date_naive(), bytes = note.len(), "daily log entry appended");
        Ok(())
    }

    /// Size in bytes of a day's log file (0 when absent).
    pub fn day_size(&self, date: NaiveDate) -> u64 {
        std::fs::metadata(self.log_path(date))
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Non-empty logs for the last `days` days (today inclusive), oldest
    /// first, as `(date, content)` pairs.
    pub fn recent_logs(&self, days: u32) -> Vec<(NaiveDate, String)> {
        let today = Utc::now().date_naive();
        let mut logs = Vec::new();
        for back in (0..days as i64).rev() {
            let date = today - Duration::days(back);
            if let Some(content) = self.read_day(date) {
                logs.push((date, content));
            }
        }
        logs
    }

    /// Delete daily log files older than `keep_days` days. Returns the
    /// number of files removed. Files whose names are not `YYYY-MM-DD.md`
    /// are left alone.
    pub fn prune_logs(&self, keep_days: u32) -> Result<usize> {
        let dir = self.logs_dir();
        let entries = match std::fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Self::io_err(&dir, e)),
        };

        let cutoff = Utc::now().date_naive() - Duration::days(keep_days as i64);
        let mut removed = 0;

        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().to_string();
            let Some(stem) = name.strip_suffix(".md") else {
                continue;
            };
            let Ok(date) = NaiveDate::parse_from_str(stem, "%Y-%m-%d") else {
                continue;
            };
            if date < cutoff {
                let path = entry.path();
                std::fs::remove_file(&path).map_err(|e| Self::io_err(&path, e))?;
                removed += 1;
            }
        }

        if removed > 0 {
            debug!(removed, keep_days, "old daily logs pruned");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn store() -> (tempfile::TempDir, MemoryStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = MemoryStore::new(dir.path());
        (dir, store)
    }

    #[test]
    fn curated_memory_is_never_created_by_reads() {
        let (dir, store) = store();
        assert!(store.read_curated().is_none());
        assert!(!dir.path().join("MEMORY.md").exists());
    }

    #[test]
    fn curated_write_then_read_round_trips() {
        let (_dir, store) = store();
        store.write_curated("# Memory\n\n- likes rust\n").unwrap();
        assert_eq!(store.read_curated().unwrap(), "# Memory\n\n- likes rust\n");
    }

    #[test]
    fn heartbeat_marker_parse_strip_stamp() {
        let at = Utc.with_ymd_and_hms(2026, 2, 3, 12, 30, 0).unwrap();
        let stamped = MemoryStore::with_heartbeat("# Memory\n\nfacts\n", at);

        assert_eq!(MemoryStore::parse_heartbeat(&stamped), Some(at));

        let stripped = MemoryStore::strip_heartbeat(&stamped);
        assert!(!stripped.contains("last_heartbeat"));
        assert!(stripped.contains("facts"));

        // idempotent
        assert_eq!(MemoryStore::strip_heartbeat(&stripped), stripped);
    }

    #[test]
    fn restamping_replaces_the_old_marker() {
        let a = Utc.with_ymd_and_hms(2026, 2, 3, 8, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2026, 2, 3, 16, 0, 0).unwrap();
        let once = MemoryStore::with_heartbeat("memory body", a);
        let twice = MemoryStore::with_heartbeat(&once, b);

        assert_eq!(twice.matches(MARKER_PREFIX).count(), 1);
        assert_eq!(MemoryStore::parse_heartbeat(&twice), Some(b));
    }

    #[test]
    fn append_today_creates_sectioned_log() {
        let (dir, store) = store();
        store.append_today("met the user").unwrap();
        store.append_today("fixed the build").unwrap();

        let today = Utc::now().date_naive();
        let content = store.read_day(today).expect("today's log");
        assert_eq!(content.matches("### ").count(), 2);
        assert!(content.contains("met the user"));
        assert!(content.contains("fixed the build"));
        assert!(dir
            .path()
            .join("memory")
            .join(format!("{}.md", today.format("%Y-%m-%d")))
            .exists());
    }

    #[test]
    fn recent_logs_skips_missing_days() {
        let (dir, store) = store();
        let today = Utc::now().date_naive();
        let old = today - Duration::days(3);
        std::fs::create_dir_all(dir.path().join("memory")).unwrap();
        std::fs::write(
            dir.path()
                .join("memory")
                .join(format!("{}.md", old.format("%Y-%m-%d"))),
            "old entry",
        )
        .unwrap();
        store.append_today("new entry").unwrap();

        let logs = store.recent_logs(7);
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].0, old);
        assert_eq!(logs[1].0, today);
    }

    #[test]
    fn prune_removes_only_old_dated_logs() {
        let (dir, store) = store();
        let mem = dir.path().join("memory");
        std::fs::create_dir_all(&mem).unwrap();

        let today = Utc::now().date_naive();
        let ancient = today - Duration::days(45);
        let recent = today - Duration::days(5);
        std::fs::write(mem.join(format!("{}.md", ancient.format("%Y-%m-%d"))), "x").unwrap();
        std::fs::write(mem.join(format!("{}.md", recent.format("%Y-%m-%d"))), "y").unwrap();
        std::fs::write(mem.join("notes.md"), "not a daily log").unwrap();

        let removed = store.prune_logs(30).unwrap();
        assert_eq!(removed, 1);
        assert!(!mem
            .join(format!("{}.md", ancient.format("%Y-%m-%d")))
            .exists());
        assert!(mem.join(format!("{}.md", recent.format("%Y-%m-%d"))).exists());
        assert!(mem.join("notes.md").exists());
    }
}
