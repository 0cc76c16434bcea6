use thiserror::Error;

/// Errors raised by the queue's own machinery (storage, serialization).
///
/// None of these reach callers through the job-execution API: they are
/// logged, and job outcomes are visible only through job status.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("storage error: {0}")]
    Storage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("payload must serialize to a JSON object, got {0}")]
    PayloadNotObject(&'static str),

    /// Synthetic: the session-wide retry cap was hit. The message is stored
    /// verbatim as the job's `last_error`.
    #[error("Max session retries exceeded")]
    SessionLimitExceeded,
}

/// Failure reported by a job handler. Drives the retry policy.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("payload decode: {0}")]
    Payload(#[from] serde_json::Error),
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self::Failed(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self::Failed(message.to_string())
    }
}
