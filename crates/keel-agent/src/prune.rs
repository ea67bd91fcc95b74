//! In-place trimming of old tool-result text within the runtime message
//! array. Two tiers: soft head+tail trim for individually large results,
//! hard clear when the combined old output is itself oversized. The
//! persisted session is never touched.

use tracing::debug;

use crate::provider::ChatMessage;

/// Assistant turns whose tool results are always left intact.
pub const KEEP_LAST_ASSISTANT_TURNS: usize = 3;
/// Combined old tool-result size that triggers the hard clear.
const HARD_CLEAR_THRESHOLD: usize = 50_000;
/// Per-result size that triggers the soft trim.
const SOFT_TRIM_MAX_CHARS: usize = 4_000;
/// Characters kept at each end by the soft trim.
const TRIM_KEEP_CHARS: usize = 1_500;

pub const CLEARED_PLACEHOLDER: &str = "[Tool result cleared — old context]";

/// Trim tool results older than the protected tail window.
///
/// Only `ToolResult` messages at positions before
/// `len - 2 * KEEP_LAST_ASSISTANT_TURNS` are considered. Idempotent:
/// applying twice equals applying once.
pub fn prune(messages: &mut [ChatMessage]) {
    let protected_from = messages
        .len()
        .saturating_sub(2 * KEEP_LAST_ASSISTANT_TURNS);
    if protected_from == 0 {
        return;
    }

    let old_total: usize = messages[..protected_from]
        .iter()
        .filter_map(|m| match m {
            ChatMessage::ToolResult(r) => Some(r.content.len()),
            _ => None,
        })
        .sum();

    let mut cleared = 0usize;
    let mut trimmed = 0usize;

    for msg in &mut messages[..protected_from] {
        let ChatMessage::ToolResult(result) = msg else {
            continue;
        };

        if old_total > HARD_CLEAR_THRESHOLD {
            if result.content != CLEARED_PLACEHOLDER {
                result.content = CLEARED_PLACEHOLDER.to_string();
                cleared += 1;
            }
        } else if result.content.chars().count() > SOFT_TRIM_MAX_CHARS {
            result.content = head_tail_trim(&result.content);
            trimmed += 1;
        }
    }

    if cleared > 0 || trimmed > 0 {
        debug!(cleared, trimmed, old_total, "old tool results pruned");
    }
}

/// `head(1500) + marker + tail(1500)`, counting characters so multi-byte
/// content never splits mid-codepoint.
fn head_tail_trim(text: &str) -> String {
    let total = text.chars().count();
    let removed = total - 2 * TRIM_KEEP_CHARS;
    let head: String = text.chars().take(TRIM_KEEP_CHARS).collect();
    let tail: String = text
        .chars()
        .skip(total - TRIM_KEEP_CHARS)
        .collect();
    format!("{head}\n\n... [{removed} chars trimmed] ...\n\n{tail}")
}
