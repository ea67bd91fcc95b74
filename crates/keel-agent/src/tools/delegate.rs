//! Tool: delegate_task. Descriptor only.
//!
//! The loop intercepts calls to this tool and routes them to the sub-agent
//! spawner; the executor never runs it. It exists so the model sees the
//! definition alongside the rest of the toolset.

use async_trait::async_trait;

use super::{Tool, ToolOutput, DELEGATE_TASK};

pub struct DelegateTool;

#[async_trait]
impl Tool for DelegateTool {
    fn name(&self) -> &str {
        DELEGATE_TASK
    }

    fn description(&self) -> &str {
        "Delegate a self-contained task to a sub-agent with its own fresh \
         context window. The sub-agent works independently and returns only a \
         summary of what it did. Use for large or noisy subtasks whose \
         intermediate output would crowd your context."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "Complete description of the task, including any \
                                    context the sub-agent needs. It cannot see this \
                                    conversation."
                }
            },
            "required": ["task"]
        })
    }

    async fn execute(&self, _input: serde_json::Value) -> ToolOutput {
        ToolOutput::error("delegate_task is routed by the agent loop and cannot be executed directly")
    }
}
