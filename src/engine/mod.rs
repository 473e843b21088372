pub mod heuristics;
pub mod recorder;
pub mod workflow;

pub use heuristics::{SubmitCandidate, SubmitKind};
pub use recorder::{LogLevel, RunEvent, RunLogEntry, RunRecorder};
pub use workflow::WorkflowEngine;
