//! Memory heartbeat: an adaptive cron job that distills the append-only
//! daily logs into curated long-term memory.
//!
//! The check phase is pure file inspection; the LLM is only consulted when
//! today's log has grown past the size threshold or too many hours have
//! passed since the last distillation. Every phase is its own durable
//! substep.

use chrono::Utc;
use keel_memory::MemoryStore;
use keel_runtime::{RuntimeError, StepContext};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::provider::{ChatMessage, CompletionRequest};
use crate::services::Services;

/// Days of logs fed into one distillation.
const DISTILL_WINDOW_DAYS: u32 = 7;
/// Output budget for the distilled memory document.
const DISTILL_MAX_TOKENS: u32 = 4096;

const DISTILL_SYSTEM_PROMPT: &str = "You maintain an agent's long-term memory file. You merge new \
daily log entries into the existing memory document: keep durable facts, preferences, and ongoing \
projects; drop ephemera and duplicates; prefer updating existing entries over appending near-copies. \
Reply with the complete new memory document in markdown and nothing else.";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HeartbeatOutcome {
    Skipped { reason: String },
    Distilled { days: usize, pruned: usize },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CheckResult {
    distill: bool,
    reason: String,
}

pub async fn run_heartbeat(
    services: &Services,
    ctx: &StepContext,
) -> Result<HeartbeatOutcome, RuntimeError> {
    let cfg = &services.config.heartbeat;

    let check: CheckResult = ctx
        .step("check", || async {
            let now = Utc::now();
            let log_size = services.memory.day_size(now.date_naive());
            if log_size > cfg.log_size_threshold {
                return Ok::<_, String>(CheckResult {
                    distill: true,
                    reason: format!("today's log is {log_size} bytes"),
                });
            }

            let last = services
                .memory
                .read_curated()
                .as_deref()
                .and_then(MemoryStore::parse_heartbeat);
            match last {
                Some(at) => {
                    let hours = (now - at).num_hours();
                    if hours > cfg.max_hours_between {
                        Ok(CheckResult {
                            distill: true,
                            reason: format!("{hours}h since last heartbeat"),
                        })
                    } else {
                        Ok(CheckResult {
                            distill: false,
                            reason: format!("log {log_size}B, last heartbeat {hours}h ago"),
                        })
                    }
                }
                None => Ok(CheckResult {
                    distill: true,
                    reason: "no heartbeat marker yet".to_string(),
                }),
            }
        })
        .await?;

    if !check.distill {
        info!(reason = %check.reason, "heartbeat: nothing to do");
        return Ok(HeartbeatOutcome::Skipped {
            reason: check.reason,
        });
    }

    let logs: Vec<(String, String)> = ctx
        .step("load", || async {
            Ok::<_, String>(
                services
                    .memory
                    .recent_logs(DISTILL_WINDOW_DAYS)
                    .into_iter()
                    .map(|(date, content)| (date.format("%Y-%m-%d").to_string(), content))
                    .collect::<Vec<_>>(),
            )
        })
        .await?;

    if logs.is_empty() {
        info!("heartbeat: no daily logs to distill");
        return Ok(HeartbeatOutcome::Skipped {
            reason: "no daily logs".to_string(),
        });
    }

    let distilled: String = ctx
        .step("distill", || {
            let logs = logs.clone();
            async move {
                let current = services
                    .memory
                    .read_curated()
                    .map(|c| MemoryStore::strip_heartbeat(&c))
                    .unwrap_or_default();

                let mut prompt = String::from("## Current memory document\n\n");
                if current.trim().is_empty() {
                    prompt.push_str("(empty)\n");
                } else {
                    prompt.push_str(&current);
                }
                prompt.push_str("\n\n## Daily logs to merge\n");
                for (date, content) in &logs {
                    prompt.push_str(&format!("\n### {date}\n{content}\n"));
                }

                let request = CompletionRequest {
                    model: services.config.agent.model.clone(),
                    system: DISTILL_SYSTEM_PROMPT.to_string(),
                    messages: vec![ChatMessage::user(prompt)],
                    tools: Vec::new(),
                    max_tokens: DISTILL_MAX_TOKENS,
                };
                let reply = services
                    .provider
                    .complete(&request)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok::<_, String>(reply.text())
            }
        })
        .await?;

    ctx.step("write", || {
        let distilled = distilled.clone();
        async move {
            let stamped = MemoryStore::with_heartbeat(&distilled, Utc::now());
            services
                .memory
                .write_curated(&stamped)
                .map_err(|e| e.to_string())
        }
    })
    .await?;

    let pruned: usize = ctx
        .step("prune", || async {
            services
                .memory
                .prune_logs(cfg.retention_days)
                .map_err(|e| e.to_string())
        })
        .await?;

    info!(days = logs.len(), pruned, "heartbeat: memory distilled");
    Ok(HeartbeatOutcome::Distilled {
        days: logs.len(),
        pruned,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use keel_core::config::KeelConfig;
    use keel_runtime::Executor;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::mock::ScriptedProvider;

    fn services_in(dir: &std::path::Path, provider: Arc<ScriptedProvider>) -> Services {
        let mut config = KeelConfig::default();
        config.agent.workspace = dir.display().to_string();
        Services::with_provider(config, provider)
    }

    #[tokio::test]
    async fn quiet_workspace_skips_without_llm_call() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = Arc::new(ScriptedProvider::new(Vec::new()));
        let services = services_in(dir.path(), Arc::clone(&provider));

        // recent marker, tiny log: both conditions are under threshold
        services
            .memory
            .write_curated(&MemoryStore::with_heartbeat("facts", Utc::now()))
            .unwrap();
        services.memory.append_today("small note").unwrap();

        let executor = Executor::new(dir.path());
        let outcome = executor
            .run("hb-test", CancellationToken::new(), |ctx| {
                let services = &services;
                async move { run_heartbeat(services, &ctx).await }
            })
            .await
            .expect("heartbeat");

        assert!(matches!(outcome, HeartbeatOutcome::Skipped { .. }));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn oversized_log_triggers_distillation_and_marker() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = Arc::new(ScriptedProvider::new(vec![ScriptedProvider::text_reply(
            "# Memory\n\n- user ships on Fridays",
        )]));
        let services = services_in(dir.path(), Arc::clone(&provider));

        services
            .memory
            .append_today(&"big entry ".repeat(1000))
            .unwrap();

        let executor = Executor::new(dir.path());
        let services2 = services_in(dir.path(), Arc::clone(&provider));
        let outcome = executor
            .run("hb-test-2", CancellationToken::new(), |ctx| {
                let services = &services2;
                async move { run_heartbeat(services, &ctx).await }
            })
            .await
            .expect("heartbeat");

        assert!(matches!(outcome, HeartbeatOutcome::Distilled { days: 1, .. }));
        assert_eq!(provider.call_count(), 1);

        let curated = services.memory.read_curated().expect("curated");
        assert!(curated.contains("ships on Fridays"));
        assert!(MemoryStore::parse_heartbeat(&curated).is_some());
    }
}
