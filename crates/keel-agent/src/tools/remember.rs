//! Tool: remember. Appends a note to today's daily memory log.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use keel_memory::MemoryStore;

use super::{Tool, ToolOutput};

#[derive(Deserialize)]
struct Params {
    note: String,
}

pub struct RememberTool {
    memory: Arc<MemoryStore>,
}

impl RememberTool {
    pub fn new(memory: Arc<MemoryStore>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Tool for RememberTool {
    fn name(&self) -> &str {
        "remember"
    }

    fn description(&self) -> &str {
        "Save a note to today's memory log. Use for facts, decisions, and \
         context worth keeping beyond this conversation. The heartbeat later \
         distills logs into long-term memory."
    }

    fn input_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "note": {
                    "type": "string",
                    "description": "The note to remember."
                }
            },
            "required": ["note"]
        })
    }

    async fn execute(&self, input: serde_json::Value) -> ToolOutput {
        let params: Params = match serde_json::from_value(input) {
            Ok(p) => p,
            Err(e) => return ToolOutput::error(format!("invalid arguments: {e}")),
        };

        if params.note.trim().is_empty() {
            return ToolOutput::error("note must not be empty");
        }

        match self.memory.append_today(&params.note) {
            Ok(()) => ToolOutput::success("Noted."),
            Err(e) => ToolOutput::error(format!("failed to save note: {e}")),
        }
    }
}
