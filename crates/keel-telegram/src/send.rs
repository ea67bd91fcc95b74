//! Message sending helpers for the Telegram adapter.
//!
//! Replies are split at 4000 characters. A split that falls inside a fenced
//! code block closes the fence before the boundary and re-opens it in the
//! next chunk. Each chunk is tried as MarkdownV2 first, with a plain-text
//! fallback when Telegram rejects the parse mode.

use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::ParseMode;
use tracing::warn;

/// Maximum characters per message (Telegram's limit is 4096).
pub const CHUNK_MAX: usize = 4000;

/// Code-fence-aware splitter.
pub fn split_chunks(text: &str) -> Vec<String> {
    if text.len() <= CHUNK_MAX {
        return vec![text.to_string()];
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut fence_lang: Option<String> = None;

    for line in text.split('\n') {
        let cost = if current.is_empty() {
            line.len()
        } else {
            1 + line.len()
        };

        if !current.is_empty() && current.len() + cost > CHUNK_MAX {
            if fence_lang.is_some() {
                current.push_str("\n```");
            }
            chunks.push(current);
            current = String::new();
            if let Some(ref lang) = fence_lang {
                current.push_str("```");
                current.push_str(lang);
                current.push('\n');
            }
        }

        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);

        let trimmed = line.trim_start();
        if let Some(after) = trimmed.strip_prefix("```") {
            fence_lang = match fence_lang {
                Some(_) => None,
                None => Some(after.trim().to_string()),
            };
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    // A single line longer than the limit still has to be force-split.
    let mut result = Vec::new();
    for chunk in chunks {
        if chunk.len() <= CHUNK_MAX {
            result.push(chunk);
            continue;
        }
        let mut remaining = chunk.as_str();
        while remaining.len() > CHUNK_MAX {
            let split_at = remaining[..CHUNK_MAX]
                .rfind('\n')
                .or_else(|| remaining[..CHUNK_MAX].rfind(' '))
                .unwrap_or(CHUNK_MAX);
            result.push(remaining[..split_at].to_string());
            remaining = remaining[split_at..].trim_start();
        }
        if !remaining.is_empty() {
            result.push(remaining.to_string());
        }
    }

    result
}

/// Escape the characters MarkdownV2 treats as markup.
pub fn escape_markdown_v2(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    for ch in text.chars() {
        match ch {
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '#' | '+' | '-' | '=' | '|' | '{'
            | '}' | '.' | '!' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Send `text` to `chat_id` in chunks.
///
/// Returns an error only when a chunk fails in both MarkdownV2 and
/// plain-text form; the reply dispatcher retries on that. A short delay
/// between chunks keeps us under Telegram's rate limits.
pub async fn send_response(
    bot: &Bot,
    chat_id: ChatId,
    thread_id: Option<teloxide::types::ThreadId>,
    text: &str,
) -> Result<(), String> {
    let chunks = split_chunks(text);
    for (i, chunk) in chunks.iter().enumerate() {
        let escaped = escape_markdown_v2(chunk);

        let mut request = bot
            .send_message(chat_id, &escaped)
            .parse_mode(ParseMode::MarkdownV2);
        if let Some(thread) = thread_id {
            request = request.message_thread_id(thread);
        }

        if request.await.is_err() {
            // MarkdownV2 rejected; retry the chunk as plain text.
            let mut plain = bot.send_message(chat_id, chunk);
            if let Some(thread) = thread_id {
                plain = plain.message_thread_id(thread);
            }
            if let Err(e) = plain.await {
                warn!(error = %e, chunk = i, "telegram send failed in both modes");
                return Err(e.to_string());
            }
        }

        if i + 1 < chunks.len() {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_single_chunk() {
        assert_eq!(split_chunks("Hello!"), vec!["Hello!".to_string()]);
    }

    #[test]
    fn long_text_splits_under_the_limit() {
        let line = "a".repeat(1500);
        let text = format!("{line}\n{line}\n{line}\n{line}");
        let chunks = split_chunks(&text);
        assert!(chunks.len() >= 2);
        for c in &chunks {
            assert!(c.len() <= CHUNK_MAX, "chunk too large: {}", c.len());
        }
    }

    #[test]
    fn fence_is_closed_and_reopened_across_chunks() {
        let mut text = String::from("Intro.\n```rust\n");
        for i in 0..160 {
            text.push_str(&format!("let variable_name_{i:04} = {i:05}; // filler\n"));
        }
        text.push_str("```\nDone.");

        let chunks = split_chunks(&text);
        assert!(chunks.len() >= 2);
        assert!(chunks[0].ends_with("```"));
        assert!(chunks[1].starts_with("```rust"));
        for c in &chunks {
            assert!(c.len() <= CHUNK_MAX);
        }
    }

    #[test]
    fn single_oversized_line_is_force_split() {
        let text = "x".repeat(9_000);
        let chunks = split_chunks(&text);
        assert!(chunks.len() >= 3);
        for c in &chunks {
            assert!(c.len() <= CHUNK_MAX);
        }
    }

    #[test]
    fn markdown_specials_are_escaped() {
        let escaped = escape_markdown_v2("a.b!c(d)e[f]");
        assert_eq!(escaped, "a\\.b\\!c\\(d\\)e\\[f\\]");
        assert_eq!(escape_markdown_v2("plain words 123"), "plain words 123");
    }
}
