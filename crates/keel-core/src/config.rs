use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{KeelError, Result};

/// Top-level config (keel.toml + environment overrides).
///
/// Two layers of environment configuration are merged over the TOML file:
/// nested `KEEL_*` overrides (`KEEL_GATEWAY__PORT=9000`) and the flat
/// well-known keys documented in the README (`AGENT_NAME`, `AGENT_MODEL`,
/// `MAX_ITERATIONS`, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeelConfig {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub compaction: CompactionConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
}

impl Default for KeelConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            compaction: CompactionConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            gateway: GatewayConfig::default(),
            channels: ChannelsConfig::default(),
        }
    }
}

impl KeelConfig {
    /// Load config: explicit path > `KEEL_CONFIG` env > `./keel.toml`,
    /// then environment overrides.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let file = path
            .map(str::to_string)
            .or_else(|| std::env::var("KEEL_CONFIG").ok())
            .unwrap_or_else(|| "keel.toml".to_string());

        Figment::new()
            .merge(Toml::file(&file))
            .merge(Env::prefixed("KEEL_").split("__"))
            .merge(flat_env_aliases())
            .extract()
            .map_err(|e| KeelError::Config(e.to_string()))
    }
}

/// Map the flat, well-known environment keys onto their nested config paths.
fn flat_env_aliases() -> Env {
    Env::raw()
        .only(&[
            "AGENT_NAME",
            "AGENT_WORKSPACE",
            "LLM_PROVIDER",
            "AGENT_MODEL",
            "MAX_ITERATIONS",
            "COMPACTION_MAX_TOKENS",
            "COMPACTION_THRESHOLD",
            "KEEP_RECENT_TOKENS",
            "HEARTBEAT_CRON",
            "MEMORY_RETENTION_DAYS",
            "TELEGRAM_BOT_TOKEN",
            "SLACK_BOT_TOKEN",
        ])
        .map(|key| {
            match key.as_str().to_ascii_uppercase().as_str() {
                "AGENT_NAME" => "agent.name".into(),
                "AGENT_WORKSPACE" => "agent.workspace".into(),
                "LLM_PROVIDER" => "agent.provider".into(),
                "AGENT_MODEL" => "agent.model".into(),
                "MAX_ITERATIONS" => "agent.max_iterations".into(),
                "COMPACTION_MAX_TOKENS" => "compaction.max_tokens".into(),
                "COMPACTION_THRESHOLD" => "compaction.threshold".into(),
                "KEEP_RECENT_TOKENS" => "compaction.keep_recent_tokens".into(),
                "HEARTBEAT_CRON" => "heartbeat.cron".into(),
                "MEMORY_RETENTION_DAYS" => "heartbeat.retention_days".into(),
                "TELEGRAM_BOT_TOKEN" => "channels.telegram.bot_token".into(),
                "SLACK_BOT_TOKEN" => "channels.slack.bot_token".into(),
                // unreachable behind only(); pass unknown keys through
                other => other.to_string().into(),
            }
        })
        .split(".")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Identity label used in the default system prompt.
    #[serde(default = "default_name")]
    pub name: String,
    /// Workspace root: sessions, memory files, and run journals live here.
    #[serde(default = "default_workspace")]
    pub workspace: String,
    /// LLM provider id: "anthropic" or "mock".
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// API key for the provider. Usually set via `KEEL_AGENT__API_KEY`.
    pub api_key: Option<String>,
    /// Hard upper bound on think/act/observe iterations per run.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            workspace: default_workspace(),
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            max_iterations: default_max_iterations(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompactionConfig {
    /// Context budget the conversation is measured against.
    #[serde(default = "default_compaction_max_tokens")]
    pub max_tokens: u32,
    /// Compact once estimated tokens exceed `max_tokens * threshold`.
    #[serde(default = "default_compaction_threshold")]
    pub threshold: f64,
    /// Token budget of the verbatim tail kept after compaction.
    #[serde(default = "default_keep_recent_tokens")]
    pub keep_recent_tokens: u32,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_compaction_max_tokens(),
            threshold: default_compaction_threshold(),
            keep_recent_tokens: default_keep_recent_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Cron expression (UTC) for the memory distillation heartbeat.
    #[serde(default = "default_heartbeat_cron")]
    pub cron: String,
    /// Daily log files older than this many days are deleted after distillation.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Distill when today's log exceeds this many bytes.
    #[serde(default = "default_log_size_threshold")]
    pub log_size_threshold: u64,
    /// Distill regardless of log size after this many hours.
    #[serde(default = "default_max_hours_between")]
    pub max_hours_between: i64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            cron: default_heartbeat_cron(),
            retention_days: default_retention_days(),
            log_size_threshold: default_log_size_threshold(),
            max_hours_between: default_max_hours_between(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    pub telegram: Option<TelegramConfig>,
    pub slack: Option<SlackConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Public HTTPS base the Telegram webhook is registered against,
    /// e.g. "https://agent.example.com". Setup is skipped when unset.
    pub webhook_base: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlackConfig {
    pub bot_token: String,
}

fn default_name() -> String {
    "Keel".to_string()
}

fn default_workspace() -> String {
    "./workspace".to_string()
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-6".to_string()
}

fn default_max_iterations() -> u32 {
    20
}

fn default_compaction_max_tokens() -> u32 {
    150_000
}

fn default_compaction_threshold() -> f64 {
    0.8
}

fn default_keep_recent_tokens() -> u32 {
    20_000
}

fn default_heartbeat_cron() -> String {
    // sec min hour dom month dow; every 30 minutes
    "0 */30 * * * *".to_string()
}

fn default_retention_days() -> u32 {
    30
}

fn default_log_size_threshold() -> u64 {
    4096
}

fn default_max_hours_between() -> i64 {
    8
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8484
}
