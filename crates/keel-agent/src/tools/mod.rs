//! Tool system for the agent loop.
//!
//! Every tool implements [`Tool`]; the registry owns the set exposed to one
//! agent flavor (main agents get `delegate_task`, sub-agents do not) and the
//! executor validates arguments and captures failures into error results.

pub mod bash;
pub mod delegate;
pub mod edit;
pub mod find;
pub mod grep;
pub mod ls;
pub mod read;
pub mod registry;
pub mod remember;
pub mod web_fetch;
pub mod write;

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::provider::ToolDefinition;

pub use registry::ToolRegistry;

/// Name of the delegation tool the loop intercepts (never executed here).
pub const DELEGATE_TASK: &str = "delegate_task";

/// Tool output cap; anything larger is cut with a truncation note.
pub const MAX_RESULT_CHARS: usize = 50_000;

/// Result of executing a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
        }
    }
}

/// Trait that all tools implement.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name, as exposed to the model (e.g. "read").
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON Schema for the tool's parameters.
    fn input_schema(&self) -> serde_json::Value;
    async fn execute(&self, input: serde_json::Value) -> ToolOutput;
}

/// Convert a tool set to API-level definitions.
pub fn to_definitions(tools: &[std::sync::Arc<dyn Tool>]) -> Vec<ToolDefinition> {
    tools
        .iter()
        .map(|t| ToolDefinition {
            name: t.name().to_string(),
            description: t.description().to_string(),
            input_schema: t.input_schema(),
        })
        .collect()
}

/// Resolve a model-supplied path inside the workspace root.
///
/// Absolute paths and `..` traversal are rejected so file tools cannot
/// escape the workspace.
pub fn resolve_workspace_path(root: &Path, path: &str) -> Result<PathBuf, String> {
    let candidate = Path::new(path);
    if candidate.is_absolute() {
        return Err(format!("absolute paths are not allowed: '{path}'"));
    }
    for component in candidate.components() {
        if matches!(component, Component::ParentDir) {
            return Err(format!("path may not contain '..': '{path}'"));
        }
    }
    Ok(root.join(candidate))
}

/// Cap tool output at [`MAX_RESULT_CHARS`] characters.
pub fn truncate_output(text: String) -> String {
    if text.chars().count() <= MAX_RESULT_CHARS {
        return text;
    }
    let head: String = text.chars().take(MAX_RESULT_CHARS).collect();
    format!("{head}\n\n[output truncated at {MAX_RESULT_CHARS} characters]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absolute_and_parent_paths_are_rejected() {
        let root = Path::new("/tmp/ws");
        assert!(resolve_workspace_path(root, "/etc/passwd").is_err());
        assert!(resolve_workspace_path(root, "../outside").is_err());
        assert!(resolve_workspace_path(root, "notes/../../outside").is_err());
        assert_eq!(
            resolve_workspace_path(root, "notes/today.md").unwrap(),
            PathBuf::from("/tmp/ws/notes/today.md")
        );
    }

    #[test]
    fn truncate_output_caps_large_text() {
        let text = "z".repeat(MAX_RESULT_CHARS + 100);
        let out = truncate_output(text);
        assert!(out.contains("[output truncated at"));
        assert!(out.chars().count() < MAX_RESULT_CHARS + 100);
    }
}
