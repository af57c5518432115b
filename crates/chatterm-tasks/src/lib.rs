mod orchestrator;
mod task;

pub use orchestrator::{TaskId, TaskOrchestrator};
pub use task::{BackgroundTask, CallbackResult};
