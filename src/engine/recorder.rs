use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::broadcast;

use crate::models::RunState;

/// Log severity for run bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// One entry in a run's log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunLogEntry {
    pub run_id: String,
    pub level: LogLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Live events observers can subscribe to while a run executes.
#[derive(Debug, Clone)]
pub enum RunEvent {
    Log(RunLogEntry),
    State { run_id: String, state: RunState },
    StepCompleted { run_id: String, name: String },
}

/// Pure bookkeeping for runs: accumulates the per-run log in memory and
/// broadcasts events to live observers. Persistence is the caller's concern.
pub struct RunRecorder {
    entries: Mutex<Vec<RunLogEntry>>,
    broadcast: broadcast::Sender<RunEvent>,
}

impl Default for RunRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl RunRecorder {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1024);
        Self {
            entries: Mutex::new(Vec::new()),
            broadcast: tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.broadcast.subscribe()
    }

    pub fn debug(&self, run_id: &str, message: impl Into<String>) {
        self.log(run_id, LogLevel::Debug, message.into());
    }

    pub fn info(&self, run_id: &str, message: impl Into<String>) {
        self.log(run_id, LogLevel::Info, message.into());
    }

    pub fn warn(&self, run_id: &str, message: impl Into<String>) {
        self.log(run_id, LogLevel::Warn, message.into());
    }

    pub fn error(&self, run_id: &str, message: impl Into<String>) {
        self.log(run_id, LogLevel::Error, message.into());
    }

    pub fn state(&self, run_id: &str, state: RunState) {
        tracing::debug!(run_id, state = state.as_str(), "state transition");
        let _ = self.broadcast.send(RunEvent::State {
            run_id: run_id.to_string(),
            state,
        });
    }

    pub fn step_completed(&self, run_id: &str, name: impl Into<String>) {
        let name = name.into();
        self.info(run_id, format!("completed: {}", name));
        let _ = self.broadcast.send(RunEvent::StepCompleted {
            run_id: run_id.to_string(),
            name,
        });
    }

    /// Snapshot of all accumulated log entries for one run.
    pub fn entries_for(&self, run_id: &str) -> Vec<RunLogEntry> {
        self.entries
            .lock()
            .expect("recorder lock poisoned")
            .iter()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect()
    }

    fn log(&self, run_id: &str, level: LogLevel, message: String) {
        match level {
            LogLevel::Debug => tracing::debug!(run_id, "{message}"),
            LogLevel::Info => tracing::info!(run_id, "{message}"),
            LogLevel::Warn => tracing::warn!(run_id, "{message}"),
            LogLevel::Error => tracing::error!(run_id, "{message}"),
        }
        let entry = RunLogEntry {
            run_id: run_id.to_string(),
            level,
            message,
            timestamp: Utc::now(),
        };
        self.entries
            .lock()
            .expect("recorder lock poisoned")
            .push(entry.clone());
        let _ = self.broadcast.send(RunEvent::Log(entry));
    }
}
