use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

use super::record::UserDataRecord;

/// Workflow state machine states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    #[default]
    Navigate,
    Detect,
    SeekEntry,
    Map,
    Fill,
    SubmitStep,
    SubmitFinal,
    Verify,
    Recover,
    Complete,
    Failed,
    Blocked,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Navigate => "navigate",
            RunState::Detect => "detect",
            RunState::SeekEntry => "seek_entry",
            RunState::Map => "map",
            RunState::Fill => "fill",
            RunState::SubmitStep => "submit_step",
            RunState::SubmitFinal => "submit_final",
            RunState::Verify => "verify",
            RunState::Recover => "recover",
            RunState::Complete => "complete",
            RunState::Failed => "failed",
            RunState::Blocked => "blocked",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Complete | RunState::Failed | RunState::Blocked)
    }
}

/// An error recorded on a run, tagged with where it happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaggedError {
    pub kind: ErrorKind,
    pub state: RunState,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TaggedError {
    pub fn new(kind: ErrorKind, state: RunState, message: impl Into<String>) -> Self {
        Self {
            kind,
            state,
            message: message.into(),
            field_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn for_field(mut self, field_id: impl Into<String>) -> Self {
        self.field_id = Some(field_id.into());
        self
    }
}

/// One execution of the engine against a (URL, record) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationRun {
    pub id: String,
    pub target_url: String,
    pub record: UserDataRecord,
    pub state: RunState,
    /// Iterations of the submit-step loop executed so far.
    pub step_count: u32,
    pub errors: Vec<TaggedError>,
    pub steps_completed: Vec<String>,
    pub fields_filled: u32,
    pub forms_detected: u32,
    /// References to captured screenshots (paths or ids, storage is external).
    pub screenshots: Vec<String>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Confidence the run actually achieved its goal, reduced when no
    /// success indicator was observed at verification.
    pub outcome_confidence: f64,
}

impl AutomationRun {
    pub fn new(target_url: impl Into<String>, record: UserDataRecord) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            target_url: target_url.into(),
            record: record.enhance(),
            state: RunState::Navigate,
            step_count: 0,
            errors: Vec::new(),
            steps_completed: Vec::new(),
            fields_filled: 0,
            forms_detected: 0,
            screenshots: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
            outcome_confidence: 0.0,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn record_error(&mut self, error: TaggedError) {
        self.errors.push(error);
    }

    pub fn finish(&mut self, state: RunState) {
        debug_assert!(state.is_terminal());
        self.state = state;
        self.completed_at = Some(Utc::now());
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|completed| (completed - self.started_at).num_milliseconds())
    }

    /// Snapshot handed to callers and persistence layers.
    pub fn report(&self) -> RunReport {
        RunReport {
            run_id: self.id.clone(),
            target_url: self.target_url.clone(),
            success: self.state == RunState::Complete,
            state: self.state,
            fields_filled: self.fields_filled,
            forms_detected: self.forms_detected,
            steps_completed: self.steps_completed.clone(),
            errors: self.errors.clone(),
            screenshots: self.screenshots.clone(),
            outcome_confidence: self.outcome_confidence,
            duration_ms: self.duration_ms(),
        }
    }
}

/// Structured run result. Always produced, even for failed runs, so callers
/// see partial progress plus the error list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub target_url: String,
    pub success: bool,
    pub state: RunState,
    pub fields_filled: u32,
    pub forms_detected: u32,
    pub steps_completed: Vec<String>,
    pub errors: Vec<TaggedError>,
    pub screenshots: Vec<String>,
    pub outcome_confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
}
