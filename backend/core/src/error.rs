use thiserror::Error;

/// Top-level error type for the Runforge schedule engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Bad schedule configuration, rejected at creation time.
    #[error("invalid schedule: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),

    /// Retryable executor failure.
    #[error("transient executor error: {0}")]
    TransientExecutor(String),

    /// Engine-detected run timeout; retryable.
    #[error("run timed out: {0}")]
    Timeout(String),

    /// Non-retryable executor failure (e.g. the action no longer exists).
    #[error("fatal executor error: {0}")]
    FatalExecutor(String),

    #[error("channel closed: {0}")]
    ChannelClosed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
