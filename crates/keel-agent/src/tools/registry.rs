//! Tool registries and the call executor.

use std::path::Path;
use std::sync::Arc;

use keel_memory::MemoryStore;
use tracing::{debug, warn};

use crate::provider::{ToolCall, ToolDefinition, ToolResultMessage};

use super::{
    bash::BashTool, delegate::DelegateTool, edit::EditTool, find::FindTool, grep::GrepTool,
    ls::LsTool, read::ReadTool, remember::RememberTool, to_definitions, truncate_output,
    web_fetch::WebFetchTool, write::WriteTool, Tool,
};

pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Registry for main agents: the full set including `delegate_task`.
    pub fn main(workspace: &Path, memory: Arc<MemoryStore>) -> Self {
        let mut registry = Self::sub_agent(workspace, memory);
        registry.tools.push(Arc::new(DelegateTool));
        registry
    }

    /// Registry for sub-agents: everything except `delegate_task`, so
    /// delegation cannot recurse.
    pub fn sub_agent(workspace: &Path, memory: Arc<MemoryStore>) -> Self {
        let root = workspace.to_path_buf();
        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(ReadTool::new(root.clone())),
            Arc::new(EditTool::new(root.clone())),
            Arc::new(WriteTool::new(root.clone())),
            Arc::new(LsTool::new(root.clone())),
            Arc::new(GrepTool::new(root.clone())),
            Arc::new(FindTool::new(root.clone())),
            Arc::new(BashTool::new(root)),
            Arc::new(RememberTool::new(memory)),
            Arc::new(WebFetchTool::new()),
        ];
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// API-level definitions for every registered tool.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        to_definitions(&self.tools)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Execute one tool call.
    ///
    /// Unknown tools, argument validation failures, and tool-body failures
    /// all come back as error results; nothing here propagates to the loop.
    pub async fn execute_call(&self, call: &ToolCall) -> ToolResultMessage {
        let Some(tool) = self.get(&call.name) else {
            warn!(tool = %call.name, "model requested unknown tool");
            return ToolResultMessage {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                content: format!("Unknown tool: {}", call.name),
                is_error: true,
            };
        };

        debug!(tool = %call.name, "executing tool");
        let output = tool.execute(call.arguments.clone()).await;

        ToolResultMessage {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            content: truncate_output(if output.is_error {
                format!("Error: {}", output.content)
            } else {
                output.content
            }),
            is_error: output.is_error,
        }
    }
}
