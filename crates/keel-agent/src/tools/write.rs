//! Tool: write. Writes a file in the workspace, creating parents as needed.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use super::{resolve_workspace_path, Tool, ToolOutput};

#[derive(Deserialize)]
struct Params {
    path: String,
    content: String,
}

pub struct WriteTool {
    root: PathBuf,
}

impl WriteTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace. Creates parent directories \
         if needed and overwrites the file if it already exists."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the workspace root."
                },
                "content": {
                    "type": "string",
                    "description": "Text content to write into the file."
                }
            },
            "required": ["path", "content"]
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

        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return ToolOutput::error(format!(
                    "failed to create directories for '{}': {e}",
                    params.path
                ));
            }
        }

        match std::fs::write(&path, &params.content) {
            Ok(()) => ToolOutput::success(format!(
                "Wrote {} bytes to {}",
                params.content.len(),
                params.path
            )),
            Err(e) => ToolOutput::error(format!("failed to write '{}': {e}", params.path)),
        }
    }
}
