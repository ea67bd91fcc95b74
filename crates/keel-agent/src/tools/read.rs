//! Tool: read. Reads a file from the workspace.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use super::{resolve_workspace_path, truncate_output, Tool, ToolOutput};

#[derive(Deserialize)]
struct Params {
    path: String,
    /// 1-based first line to return.
    offset: Option<usize>,
    /// Maximum number of lines to return.
    limit: Option<usize>,
}

pub struct ReadTool {
    root: PathBuf,
}

impl ReadTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Read the contents of a file in the workspace. Optionally limit to a \
         line range with `offset` (1-based first line) and `limit`."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the workspace root."
                },
                "offset": {
                    "type": "integer",
                    "description": "1-based line number to start reading from (optional)."
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to return (optional)."
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolOutput {
        let params: Params = match serde_json::from_value(input) {
            Ok(p) => p,
            Err(e) => return ToolOutput::error(format!("invalid arguments: {e}")),
        };

        let path = match resolve_workspace_path(&self.root, &params.path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::error(e),
        };

        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) => return ToolOutput::error(format!("failed to read '{}': {e}", params.path)),
        };

        let result = if params.offset.is_some() || params.limit.is_some() {
            let start = params.offset.unwrap_or(1).saturating_sub(1);
            let lines: Vec<&str> = content.lines().skip(start).collect();
            let lines = match params.limit {
                Some(n) => &lines[..n.min(lines.len())],
                None => &lines[..],
            };
            lines.join("\n")
        } else {
            content
        };

        ToolOutput::success(truncate_output(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_line_ranges() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("f.txt"), "one\ntwo\nthree\nfour\n").unwrap();
        let tool = ReadTool::new(dir.path().to_path_buf());

        let out = tool
            .execute(serde_json::json!({"path": "f.txt", "offset": 2, "limit": 2}))
            .await;
        assert!(!out.is_error);
        assert_eq!(out.content, "two\nthree");
    }

    #[tokio::test]
    async fn missing_file_is_an_error_result() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tool = ReadTool::new(dir.path().to_path_buf());
        let out = tool.execute(serde_json::json!({"path": "absent.txt"})).await;
        assert!(out.is_error);
    }

    #[tokio::test]
    async fn escaping_the_workspace_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let tool = ReadTool::new(dir.path().to_path_buf());
        let out = tool
            .execute(serde_json::json!({"path": "../../etc/hostname"}))
            .await;
        assert!(out.is_error);
    }
}
