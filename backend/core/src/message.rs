use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Invocation handed to the Executor when a run is dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub run_id: Uuid,
    pub numbered_id: i64,
    pub action_id: String,
    pub inputs: serde_json::Value,
    pub timeout_seconds: u64,
}

/// Failure reported by the Executor for an invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutorFailure {
    /// Retryable (worker busy, network blip, ...).
    Transient { message: String },
    /// Never retried (e.g. the referenced action no longer exists).
    Fatal { message: String },
}

impl ExecutorFailure {
    pub fn transient(message: impl Into<String>) -> Self {
        ExecutorFailure::Transient { message: message.into() }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        ExecutorFailure::Fatal { message: message.into() }
    }

    pub fn message(&self) -> &str {
        match self {
            ExecutorFailure::Transient { message } | ExecutorFailure::Fatal { message } => message,
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, ExecutorFailure::Fatal { .. })
    }
}

/// Completion signal posted by the Executor to the engine's channel.
///
/// The Executor must post exactly one of these per acknowledged invocation,
/// eventually, or the engine's timeout path takes over.
#[derive(Debug, Clone)]
pub struct CompletionEvent {
    pub run_id: Uuid,
    pub outcome: Result<serde_json::Value, ExecutorFailure>,
}

impl CompletionEvent {
    pub fn success(run_id: Uuid, result: serde_json::Value) -> Self {
        Self { run_id, outcome: Ok(result) }
    }

    pub fn failure(run_id: Uuid, failure: ExecutorFailure) -> Self {
        Self { run_id, outcome: Err(failure) }
    }
}
