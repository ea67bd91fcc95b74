//! Telegram `ChannelHandler`: reply delivery, typing acknowledgement, and
//! idempotent webhook registration.

use async_trait::async_trait;
use keel_channels::{ChannelError, ChannelHandler};
use keel_core::config::TelegramConfig;
use keel_core::event::Destination;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, MessageId, ThreadId};
use tracing::{debug, info, warn};

use crate::send;
use crate::transform::CHANNEL;

pub struct TelegramHandler {
    bot: Bot,
    token: String,
    webhook_base: Option<String>,
    http: reqwest::Client,
}

impl TelegramHandler {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            bot: Bot::new(&config.bot_token),
            token: config.bot_token.clone(),
            webhook_base: config.webhook_base.clone(),
            http: reqwest::Client::new(),
        }
    }

    /// Telegram documents `destination.chat_id` as the routing source; the
    /// chat id in `channel_meta` is the same value and only a fallback.
    fn chat_id(destination: &Destination, meta: &serde_json::Value) -> Result<ChatId, ChannelError> {
        destination
            .chat_id
            .parse::<i64>()
            .ok()
            .or_else(|| meta.get("chat_id").and_then(|v| v.as_i64()))
            .map(ChatId)
            .ok_or_else(|| {
                ChannelError::Send(format!("unusable chat id: '{}'", destination.chat_id))
            })
    }

    fn thread_id(destination: &Destination) -> Option<ThreadId> {
        destination
            .thread_id
            .as_deref()
            .and_then(|t| t.parse::<i32>().ok())
            .map(|t| ThreadId(MessageId(t)))
    }
}

#[async_trait]
impl ChannelHandler for TelegramHandler {
    fn name(&self) -> &str {
        CHANNEL
    }

    async fn send_reply(
        &self,
        response: &str,
        destination: &Destination,
        channel_meta: &serde_json::Value,
    ) -> Result<(), ChannelError> {
        let chat_id = Self::chat_id(destination, channel_meta)?;
        let thread_id = Self::thread_id(destination);
        debug!(chat = chat_id.0, bytes = response.len(), "sending telegram reply");

        send::send_response(&self.bot, chat_id, thread_id, response)
            .await
            .map_err(ChannelError::Send)
    }

    async fn acknowledge(&self, destination: &Destination, channel_meta: &serde_json::Value) {
        let Ok(chat_id) = Self::chat_id(destination, channel_meta) else {
            return;
        };
        if let Err(e) = self.bot.send_chat_action(chat_id, ChatAction::Typing).await {
            debug!(error = %e, "typing indicator failed");
        }
    }

    /// Register the webhook with the Bot API. Safe to repeat: Telegram
    /// treats setWebhook with the same URL as a no-op.
    async fn setup(&self) -> Result<(), ChannelError> {
        let Some(base) = &self.webhook_base else {
            info!("telegram webhook_base not configured, skipping webhook setup");
            return Ok(());
        };

        let url = format!("{}/webhooks/{CHANNEL}", base.trim_end_matches('/'));
        let api = format!("https://api.telegram.org/bot{}/setWebhook", self.token);

        let resp = self
            .http
            .post(&api)
            .form(&[("url", url.as_str())])
            .send()
            .await
            .map_err(|e| ChannelError::Setup(e.to_string()))?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(body = %body, "setWebhook rejected");
            return Err(ChannelError::Setup(body));
        }

        info!(url = %url, "telegram webhook registered");
        Ok(())
    }
}
