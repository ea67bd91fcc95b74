//! Telegram channel adapter: webhook transform, MarkdownV2 sending with
//! code-fence-aware chunking, typing-indicator acknowledgement, and
//! idempotent webhook registration.

pub mod handler;
pub mod send;
pub mod transform;

pub use handler::TelegramHandler;
pub use transform::TelegramTransform;
