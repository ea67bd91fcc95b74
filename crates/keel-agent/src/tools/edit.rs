//! Tool: edit. Replaces an exact string in a workspace file.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::Deserialize;

use super::{resolve_workspace_path, Tool, ToolOutput};

#[derive(Deserialize)]
struct Params {
    path: String,
    old_string: String,
    new_string: String,
}

pub struct EditTool {
    root: PathBuf,
}

impl EditTool {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Edit a file by replacing an exact string. `old_string` must appear \
         exactly once in the file; include enough surrounding context to make \
         it unique."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path relative to the workspace root."
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact text to replace (must be unique in the file)."
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement text."
                }
            },
            "required": ["path", "old_string", "new_string"]
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

        let occurrences = content.matches(&params.old_string).count();
        if occurrences == 0 {
            return ToolOutput::error(format!("old_string not found in '{}'", params.path));
        }
        if occurrences > 1 {
            return ToolOutput::error(format!(
                "old_string appears {occurrences} times in '{}'; add more context to make it unique",
                params.path
            ));
        }

        let updated = content.replacen(&params.old_string, &params.new_string, 1);
        match std::fs::write(&path, updated) {
            Ok(()) => ToolOutput::success(format!("Edited {}", params.path)),
            Err(e) => ToolOutput::error(format!("failed to write '{}': {e}", params.path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replaces_a_unique_match() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("f.txt"), "alpha beta gamma").unwrap();
        let tool = EditTool::new(dir.path().to_path_buf());

        let out = tool
            .execute(serde_json::json!({
                "path": "f.txt", "old_string": "beta", "new_string": "BETA"
            }))
            .await;
        assert!(!out.is_error);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("f.txt")).unwrap(),
            "alpha BETA gamma"
        );
    }

    #[tokio::test]
    async fn ambiguous_match_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("f.txt"), "dup dup").unwrap();
        let tool = EditTool::new(dir.path().to_path_buf());

        let out = tool
            .execute(serde_json::json!({
                "path": "f.txt", "old_string": "dup", "new_string": "x"
            }))
            .await;
        assert!(out.is_error);
        assert!(out.content.contains("2 times"));
    }
}
