//! Explicit runtime context, constructed once at startup and threaded
//! through every function. No module-level mutability anywhere.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use keel_core::config::{AgentConfig, KeelConfig};
use keel_core::{KeelError, Result};
use keel_memory::MemoryStore;
use keel_sessions::SessionStore;
use tracing::info;

use crate::anthropic::AnthropicProvider;
use crate::context::ContextAssembler;
use crate::mock::EchoProvider;
use crate::provider::LlmProvider;
use crate::tools::ToolRegistry;

/// Everything an agent run needs, bundled.
pub struct Services {
    pub config: Arc<KeelConfig>,
    pub provider: Arc<dyn LlmProvider>,
    pub sessions: Arc<SessionStore>,
    pub memory: Arc<MemoryStore>,
    pub assembler: ContextAssembler,
    pub main_tools: Arc<ToolRegistry>,
    pub sub_agent_tools: Arc<ToolRegistry>,
    workspace: PathBuf,
}

impl Services {
    pub fn new(config: KeelConfig) -> Result<Self> {
        let provider = build_provider(&config.agent)?;
        Ok(Self::with_provider(config, provider))
    }

    /// Build services around an externally supplied provider (tests inject
    /// the scripted mock here).
    pub fn with_provider(config: KeelConfig, provider: Arc<dyn LlmProvider>) -> Self {
        let workspace = PathBuf::from(&config.agent.workspace);

        let sessions = Arc::new(SessionStore::new(&workspace));
        let memory = Arc::new(MemoryStore::new(&workspace));
        let assembler = ContextAssembler::new(
            Arc::clone(&memory),
            Arc::clone(&sessions),
            config.agent.name.clone(),
        );
        let main_tools = Arc::new(ToolRegistry::main(&workspace, Arc::clone(&memory)));
        let sub_agent_tools = Arc::new(ToolRegistry::sub_agent(&workspace, Arc::clone(&memory)));

        Self {
            config: Arc::new(config),
            provider,
            sessions,
            memory,
            assembler,
            main_tools,
            sub_agent_tools,
            workspace,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Create the workspace directory tree if it does not exist yet.
    pub fn ensure_workspace(&self) -> Result<()> {
        std::fs::create_dir_all(&self.workspace)?;
        Ok(())
    }
}

fn build_provider(agent: &AgentConfig) -> Result<Arc<dyn LlmProvider>> {
    match agent.provider.as_str() {
        "anthropic" => {
            let api_key = agent
                .api_key
                .clone()
                .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
                .ok_or_else(|| {
                    KeelError::Config(
                        "anthropic provider selected but no API key configured".to_string(),
                    )
                })?;
            info!(provider = "anthropic", model = %agent.model, "LLM provider initialized");
            Ok(Arc::new(AnthropicProvider::new(api_key, None)))
        }
        "mock" => {
            info!(provider = "mock", "echo provider initialized");
            Ok(Arc::new(EchoProvider))
        }
        other => Err(KeelError::Config(format!("unknown LLM provider: '{other}'"))),
    }
}
