//! Slack `ChannelHandler`: replies via `chat.postMessage`, acknowledgement
//! via an emoji reaction on the triggering message.

use async_trait::async_trait;
use keel_channels::{ChannelError, ChannelHandler};
use keel_core::config::SlackConfig;
use keel_core::event::Destination;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::transform::CHANNEL;

/// Slack rejects messages past 40k characters, but anything above this is
/// unreadable in a channel; split like other chat surfaces do.
const CHUNK_MAX: usize = 4_000;

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    error: Option<String>,
}

pub struct SlackHandler {
    http: reqwest::Client,
    bot_token: String,
}

impl SlackHandler {
    pub fn new(config: &SlackConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token: config.bot_token.clone(),
        }
    }

    /// `channel_meta` is the authoritative routing source for Slack; the
    /// destination's `chat_id` is the fallback.
    fn route(destination: &Destination, meta: &serde_json::Value) -> (String, Option<String>) {
        let channel = meta
            .get("channel")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| destination.chat_id.clone());
        let thread_ts = meta
            .get("thread_ts")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| destination.thread_id.clone());
        (channel, thread_ts)
    }

    async fn call_api(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<(), ChannelError> {
        let url = format!("https://slack.com/api/{method}");
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.bot_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))?;

        let parsed: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))?;
        if !parsed.ok {
            return Err(ChannelError::Send(
                parsed.error.unwrap_or_else(|| "unknown Slack error".to_string()),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelHandler for SlackHandler {
    fn name(&self) -> &str {
        CHANNEL
    }

    async fn send_reply(
        &self,
        response: &str,
        destination: &Destination,
        channel_meta: &serde_json::Value,
    ) -> Result<(), ChannelError> {
        let (channel, thread_ts) = Self::route(destination, channel_meta);
        debug!(channel = %channel, bytes = response.len(), "sending slack reply");

        for chunk in split_chunks(&to_mrkdwn(response)) {
            let mut body = serde_json::json!({
                "channel": channel,
                "text": chunk,
            });
            if let Some(ts) = &thread_ts {
                body["thread_ts"] = serde_json::json!(ts);
            }
            self.call_api("chat.postMessage", body).await?;
        }
        Ok(())
    }

    async fn acknowledge(&self, destination: &Destination, channel_meta: &serde_json::Value) {
        let (channel, _) = Self::route(destination, channel_meta);
        let Some(ts) = destination.message_id.as_deref() else {
            return;
        };
        let body = serde_json::json!({
            "channel": channel,
            "timestamp": ts,
            "name": "eyes",
        });
        if let Err(e) = self.call_api("reactions.add", body).await {
            warn!(error = %e, "slack acknowledge failed");
        }
    }
}

/// Standard markdown → Slack mrkdwn: bold markers collapse from `**` to `*`.
fn to_mrkdwn(text: &str) -> String {
    text.replace("**", "*")
}

/// Newline-preferring splitter; a single oversized line is hard-cut.
fn split_chunks(text: &str) -> Vec<String> {
    if text.len() <= CHUNK_MAX {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;
    while remaining.len() > CHUNK_MAX {
        let split_at = remaining[..CHUNK_MAX]
            .rfind('\n')
            .or_else(|| remaining[..CHUNK_MAX].rfind(' '))
            .unwrap_or(CHUNK_MAX);
        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start_matches(['\n', ' ']);
    }
    if !remaining.is_empty() {
        chunks.push(remaining.to_string());
    }
    chunks
}
