use async_trait::async_trait;
use uuid::Uuid;

use crate::message::{ExecuteRequest, ExecutorFailure};

/// External component that performs an action's actual work.
///
/// `execute` is an acknowledgment only: the implementation runs the work in
/// its own task and posts exactly one `CompletionEvent` for the run to the
/// engine's completion channel, eventually. If no completion arrives within
/// the request's timeout, the engine's timeout path takes over.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    /// Accept an invocation. An `Err` means the invocation was never started.
    async fn execute(&self, request: ExecuteRequest) -> Result<(), ExecutorFailure>;

    /// Best-effort cancellation of an in-flight run. No-op by default.
    async fn cancel(&self, _run_id: Uuid) {}
}

/// Failure notifications, fire-and-forget. No delivery guarantee is required
/// of implementations and the engine never waits on the outcome.
#[async_trait]
pub trait Notifier: Send + Sync + 'static {
    async fn notify(&self, run_id: Uuid, schedule_id: Option<Uuid>, error_message: &str);
}
