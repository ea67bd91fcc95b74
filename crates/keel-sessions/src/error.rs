use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error for session '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
