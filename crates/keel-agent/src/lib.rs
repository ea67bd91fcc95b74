//! The agent engine: LLM gateway, context assembly, tool execution, context
//! pruning and compaction, the durable think/act/observe loop, sub-agent
//! delegation, and the memory heartbeat.

pub mod compact;
pub mod context;
pub mod heartbeat;
pub mod mock;
pub mod provider;
pub mod prune;
pub mod run;
pub mod services;
pub mod subagent;
pub mod tools;

mod anthropic;

pub use provider::{
    AssistantMessage, ChatMessage, CompletionRequest, ContentBlock, LlmProvider, ProviderError,
    StopReason, ToolCall, ToolDefinition, ToolResultMessage, Usage,
};
pub use services::Services;
