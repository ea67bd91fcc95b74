use async_trait::async_trait;

use keel_core::event::Destination;

use crate::error::ChannelError;

/// Outbound interface implemented once per messaging platform.
///
/// `channel_meta` is whatever the platform's transform attached to the
/// inbound event; handlers treat it as authoritative routing state and fall
/// back to `destination` fields where their platform documents them.
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    /// Stable lowercase identifier, unique across registered handlers.
    fn name(&self) -> &str;

    /// Deliver the agent's reply: format for the platform, split oversized
    /// messages, send. Called by the reply dispatcher, which retries.
    async fn send_reply(
        &self,
        response: &str,
        destination: &Destination,
        channel_meta: &serde_json::Value,
    ) -> Result<(), ChannelError>;

    /// Best-effort receipt signal (typing indicator, reaction). Failures are
    /// swallowed by the dispatcher; implementations should still log them.
    async fn acknowledge(&self, destination: &Destination, channel_meta: &serde_json::Value);

    /// Idempotent registration with the ingress platform (e.g. webhook
    /// setup). Default: nothing to do.
    async fn setup(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}
