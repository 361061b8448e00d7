pub mod error;
pub mod message;
pub mod traits;
pub mod types;

pub use error::EngineError;
pub use message::{CompletionEvent, ExecuteRequest, ExecutorFailure};
pub use traits::{Executor, Notifier};
pub use types::{Run, RunStatus, Schedule, ScheduleSpec};
