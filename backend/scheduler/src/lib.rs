pub mod calculator;
pub mod counter;
pub mod engine;
pub mod guard;
pub mod orchestrator;
pub mod retry;
pub mod run_store;
pub mod schedule_store;
pub mod store;
pub mod validation;

pub use engine::Engine;
pub use guard::Admission;
pub use orchestrator::RunOrchestrator;
pub use retry::RetryManager;
pub use store::Database;
