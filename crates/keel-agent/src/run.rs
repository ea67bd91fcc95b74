//! The agent loop: bounded think/act/observe with per-step durability.
//!
//! Every LLM call, tool execution, and sub-agent spawn goes through
//! [`StepContext::step`], so a retried run replays completed work. Between
//! substeps the loop is purely computational.

use std::sync::OnceLock;

use keel_core::event::RunResult;
use keel_runtime::{RuntimeError, StepContext};
use keel_sessions::{MessageMeta, Role};
use regex::Regex;
use tracing::{info, warn};

use crate::compact::Compactor;
use crate::provider::{AssistantMessage, ChatMessage, CompletionRequest, ToolResultMessage};
use crate::prune;
use crate::services::Services;
use crate::subagent;
use crate::tools::DELEGATE_TASK;

/// Persisted turns loaded as conversation history.
const HISTORY_WINDOW: usize = 10;
/// Output budget per think call.
const REPLY_MAX_TOKENS: u32 = 8192;
/// Messages kept verbatim by the emergency overflow recovery.
const EMERGENCY_KEEP: usize = 6;
/// Per-message cap applied by the emergency recovery.
const EMERGENCY_TRUNCATE_CHARS: usize = 200;

/// Provider error text that indicates the prompt outgrew the context window.
pub fn is_context_overflow(message: &str) -> bool {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)context.?overflow|prompt.?too.?large|too many tokens|maximum context|token limit",
        )
        .expect("overflow pattern compiles")
    });
    re.is_match(message)
}

/// Drive one complete agent run for `session_key`.
///
/// Returns once the model produces a plain-text reply, the iteration budget
/// is exhausted, or an unrecoverable substep failure bubbles up for the
/// executor to retry.
pub async fn run_agent(
    services: &Services,
    ctx: &StepContext,
    session_key: &str,
    incoming: &str,
    is_sub_agent: bool,
) -> Result<RunResult, RuntimeError> {
    services
        .ensure_workspace()
        .map_err(|e| RuntimeError::Other(e.to_string()))?;

    let cfg = &services.config;
    let max_iterations = cfg.agent.max_iterations;
    let tools = if is_sub_agent {
        &services.sub_agent_tools
    } else {
        &services.main_tools
    };
    let tool_definitions = tools.definitions();

    let system_prompt = services.assembler.build_system_prompt();
    let mut history = services.assembler.build_history(session_key, HISTORY_WINDOW);

    let compactor = Compactor::new(cfg.compaction.clone(), cfg.agent.model.clone());
    if compactor.should_compact(&history) {
        let input = history.clone();
        history = ctx
            .step("compact", || {
                let input = input.clone();
                async {
                    compactor
                        .compact(
                            services.provider.as_ref(),
                            &services.sessions,
                            session_key,
                            input,
                        )
                        .await
                }
            })
            .await?;
    }

    let mut messages = history;
    messages.push(ChatMessage::user(incoming));

    let mut iterations: u32 = 0;
    let mut total_tool_calls: u32 = 0;
    let mut final_response: Option<String> = None;
    let mut has_compacted_this_run = false;

    while final_response.is_none() && iterations < max_iterations {
        iterations += 1;

        if iterations as usize > prune::KEEP_LAST_ASSISTANT_TURNS {
            prune::prune(&mut messages);
        }

        if iterations >= max_iterations.saturating_sub(3) {
            messages.push(ChatMessage::user(format!(
                "[SYSTEM: iteration {iterations}/{max_iterations} — respond to the user NOW \
                 with plain text; no more tool calls]"
            )));
        } else if iterations >= max_iterations.saturating_sub(10) {
            messages.push(ChatMessage::user(format!(
                "[SYSTEM: iteration {iterations}/{max_iterations} — wrap up soon]"
            )));
        }

        let request = CompletionRequest {
            model: cfg.agent.model.clone(),
            system: system_prompt.clone(),
            messages: messages.clone(),
            tools: tool_definitions.clone(),
            max_tokens: REPLY_MAX_TOKENS,
        };

        // An error stop reason is recorded output only when it is the one
        // overflow this run may recover from; everything else fails the
        // attempt so the substep retries.
        let overflow_trap_armed = !has_compacted_this_run;
        let reply: AssistantMessage = ctx
            .step("think", || {
                let request = request.clone();
                async move {
                    let msg = services
                        .provider
                        .complete(&request)
                        .await
                        .map_err(|e| e.to_string())?;
                    if let Some(err) = msg.error_message() {
                        if !(overflow_trap_armed && is_context_overflow(err)) {
                            return Err(format!("provider returned error stop reason: {err}"));
                        }
                    }
                    Ok(msg)
                }
            })
            .await?;

        if let Some(err) = reply.error_message() {
            warn!(session = %session_key, error = %err, "context overflow, applying emergency summarization");
            emergency_compact(&mut messages);
            has_compacted_this_run = true;
            iterations -= 1;
            continue;
        }

        let tool_calls = reply.tool_calls();
        let text = reply.text();

        if tool_calls.is_empty() && !text.trim().is_empty() {
            final_response = Some(text);
            break;
        }

        messages.push(ChatMessage::Assistant(reply));

        // Tool calls execute sequentially, in the order the model emitted them.
        for call in &tool_calls {
            let result: ToolResultMessage = if call.name == DELEGATE_TASK && !is_sub_agent {
                let task = call
                    .arguments
                    .get("task")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let outcome = ctx
                    .step("delegate", || {
                        subagent::spawn(services, ctx.child_token(), session_key, task.clone())
                    })
                    .await?;
                ToolResultMessage {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    content: outcome.summary,
                    is_error: outcome.is_error,
                }
            } else {
                ctx.step(&format!("tool:{}", call.name), || async {
                    Ok::<_, String>(tools.execute_call(call).await)
                })
                .await?
            };

            messages.push(ChatMessage::ToolResult(result));
            total_tool_calls += 1;
        }
    }

    let response =
        final_response.unwrap_or_else(|| format!("(Reached max iterations: {max_iterations})"));

    ctx.step("persist", || {
        let response = response.clone();
        async move {
            services
                .sessions
                .append(session_key, Role::User, incoming, None)
                .map_err(|e| e.to_string())?;
            services
                .sessions
                .append(
                    session_key,
                    Role::Assistant,
                    &response,
                    Some(MessageMeta {
                        iterations: Some(iterations),
                        tool_calls: Some(total_tool_calls),
                    }),
                )
                .map_err(|e| e.to_string())
        }
    })
    .await?;

    info!(
        session = %session_key,
        iterations,
        tool_calls = total_tool_calls,
        sub_agent = is_sub_agent,
        "run complete"
    );

    Ok(RunResult {
        response,
        iterations,
        tool_calls: total_tool_calls,
        model: cfg.agent.model.clone(),
    })
}

/// Last-resort in-place summarization after a context-overflow rejection:
/// keep the most recent messages verbatim and collapse everything older into
/// one synthetic user message, each old entry coarsely cut to 200 chars.
fn emergency_compact(messages: &mut Vec<ChatMessage>) {
    let keep = messages.len().min(EMERGENCY_KEEP);
    let cut = messages.len() - keep;
    if cut == 0 {
        return;
    }

    let mut lines: Vec<String> = Vec::with_capacity(cut);
    for msg in &messages[..cut] {
        let (role, text) = match msg {
            ChatMessage::User { text } => ("User", text.clone()),
            ChatMessage::Assistant(reply) => ("Assistant", reply.text()),
            ChatMessage::ToolResult(result) => ("Tool result", result.content.clone()),
        };
        let truncated: String = text.chars().take(EMERGENCY_TRUNCATE_CHARS).collect();
        lines.push(format!("{role}: {truncated}"));
    }

    let synthetic = ChatMessage::user(format!(
        "Earlier conversation, truncated after a context overflow:\n{}",
        lines.join("\n")
    ));

    let tail = messages.split_off(cut);
    messages.clear();
    messages.push(synthetic);
    messages.extend(tail);
}
