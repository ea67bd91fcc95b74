//! Tool: grep. Recursively searches workspace file contents with a regex.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use super::{resolve_workspace_path, truncate_output, Tool, ToolOutput};

/// Maximum number of matching lines returned.
const MAX_MATCHES: usize = 100;

#[derive(Deserialize)]
struct Params {
    pattern: String,
    #[serde(default = "default_path")]
    path: String,
    /// Optional filename suffix filter, e.g. ".rs".
    file_pattern: Option<String>,
}

fn default_path() -> String {
    ".".to_string()
}

pub struct GrepTool {
    root: PathBuf,
}

impl GrepTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for GrepTool {
    fn name(&self) -> &str {
        "grep"
    }

    fn description(&self) -> &str {
        "Recursively search workspace files for a regular expression. Returns \
         matching lines as `file:line_number: content`, at most 100 matches. \
         Skips hidden directories and binary files."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regular expression to search for."
                },
                "path": {
                    "type": "string",
                    "description": "Directory relative to the workspace root (default: '.')."
                },
                "file_pattern": {
                    "type": "string",
                    "description": "Optional filename suffix filter, e.g. '.rs' or '.md'."
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

        let regex = match regex::Regex::new(&params.pattern) {
            Ok(r) => r,
            Err(e) => return ToolOutput::error(format!("invalid pattern: {e}")),
        };

        let root = match resolve_workspace_path(&self.root, &params.path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::error(e),
        };

        let mut matches: Vec<String> = Vec::new();
        let mut truncated = false;
        search_dir(
            &root,
            &root,
            &regex,
            params.file_pattern.as_deref(),
            &mut matches,
            &mut truncated,
        );

        if matches.is_empty() {
            return ToolOutput::success("No matches found.");
        }

        let mut output = matches.join("\n");
        if truncated {
            output.push_str(&format!("\n\n[truncated at {MAX_MATCHES} matches]"));
        }
        ToolOutput::success(truncate_output(output))
    }
}

fn search_dir(
    base: &Path,
    dir: &Path,
    regex: &regex::Regex,
    file_pattern: Option<&str>,
    matches: &mut Vec<String>,
    truncated: &mut bool,
) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        if matches.len() >= MAX_MATCHES {
            *truncated = true;
            return;
        }

        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }

        if path.is_dir() {
            search_dir(base, &path, regex, file_pattern, matches, truncated);
            continue;
        }

        if let Some(suffix) = file_pattern {
            if !name.ends_with(suffix) {
                continue;
            }
        }

        // Skip files that are not valid UTF-8 (binary).
        let Ok(content) = std::fs::read_to_string(&path) else {
            continue;
        };

        let display = path.strip_prefix(base).unwrap_or(&path).display().to_string();
        for (n, line) in content.lines().enumerate() {
            if regex.is_match(line) {
                matches.push(format!("{display}:{}: {line}", n + 1));
                if matches.len() >= MAX_MATCHES {
                    *truncated = true;
                    return;
                }
            }
        }
    }
}
