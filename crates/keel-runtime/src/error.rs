use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The run's cancellation token fired; observed at a substep boundary.
    #[error("run cancelled")]
    Cancelled,

    #[error("journal error: {0}")]
    Journal(String),

    #[error("substep '{step}' failed after {attempts} attempts: {reason}")]
    StepFailed {
        step: String,
        attempts: u32,
        reason: String,
    },

    #[error("invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
