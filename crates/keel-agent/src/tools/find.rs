//! Tool: find. Locates workspace files by name substring.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use super::{resolve_workspace_path, Tool, ToolOutput};

const MAX_RESULTS: usize = 200;

#[derive(Deserialize)]
struct Params {
    pattern: String,
    #[serde(default = "default_path")]
    path: String,
}

fn default_path() -> String {
    ".".to_string()
}

pub struct FindTool {
    root: PathBuf,
}

impl FindTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for FindTool {
    fn name(&self) -> &str {
        "find"
    }

    fn description(&self) -> &str {
        "Find workspace files whose name contains the given substring. \
         Searches recursively, skips hidden directories, returns at most 200 paths."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Substring to match against file names."
                },
                "path": {
                    "type": "string",
                    "description": "Directory relative to the workspace root (default: '.')."
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolOutput {
        let params: Params = match serde_json::from_value(input) {
            Ok(p) => p,
            Err(e) => return ToolOutput::error(format!("invalid arguments: {e}")),
        };

        let root = match resolve_workspace_path(&self.root, &params.path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::error(e),
        };

        let mut results: Vec<String> = Vec::new();
        walk(&root, &root, &params.pattern, &mut results);

        if results.is_empty() {
            return ToolOutput::success("No files found.");
        }
        results.sort();
        let truncated = results.len() >= MAX_RESULTS;
        let mut output = results.join("\n");
        if truncated {
            output.push_str(&format!("\n\n[truncated at {MAX_RESULTS} results]"));
        }
        ToolOutput::success(output)
    }
}

fn walk(base: &Path, dir: &Path, pattern: &str, results: &mut Vec<String>) {
    if results.len() >= MAX_RESULTS {
        return;
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        if results.len() >= MAX_RESULTS {
            return;
        }
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        if path.is_dir() {
            walk(base, &path, pattern, results);
        } else if name.contains(pattern) {
            let display = path.strip_prefix(base).unwrap_or(&path).display().to_string();
            results.push(display);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finds_by_name_substring() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/b/report.md"), "x").unwrap();
        std::fs::write(dir.path().join("other.txt"), "y").unwrap();
        let tool = FindTool::new(dir.path().to_path_buf());

        let out = tool.execute(serde_json::json!({"pattern": "report"})).await;
        assert!(!out.is_error);
        assert!(out.content.contains("a/b/report.md"));
        assert!(!out.content.contains("other.txt"));
    }
}
