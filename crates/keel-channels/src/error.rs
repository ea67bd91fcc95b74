use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("send failed: {0}")]
    Send(String),

    #[error("setup failed: {0}")]
    Setup(String),

    #[error("no handler registered for channel '{0}'")]
    UnknownChannel(String),
}
