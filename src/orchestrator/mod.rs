//! The run loop tying the engine together: map phase to task, invoke the
//! worker, parse one event, apply it, persist, repeat.

mod runner;

pub use runner::{Orchestrator, WorkflowResult};
