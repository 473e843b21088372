use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error category recorded on a run. Mirrors the engine error taxonomy but
/// stays serializable so run reports can carry it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Detection,
    MappingWarning,
    Interaction,
    Navigation,
    DriverTimeout,
    Submission,
    CaptchaDetected,
    MaxStepsExceeded,
    Cancelled,
}

/// Errors raised at the browser driver boundary.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("timeout after {timeout_ms}ms: {what}")]
    Timeout { what: String, timeout_ms: u64 },

    #[error("no page available")]
    NoPage,

    #[error("element not found: {0}")]
    NotFound(String),

    #[error("browser protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    pub fn protocol(e: impl std::fmt::Display) -> Self {
        DriverError::Protocol(e.to_string())
    }
}

/// Errors that change a run's course. Field-level failures are absorbed into
/// the run's error list; only the fatal categories terminate a run.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("no forms detected after entry-point search")]
    NoFormsDetected,

    #[error("no submit path found: {0}")]
    Submission(String),

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("driver timeout: {0}")]
    DriverTimeout(String),

    #[error("interaction with field '{field_id}' failed: {message}")]
    Interaction { field_id: String, message: String },

    #[error("captcha detected, human intervention required")]
    CaptchaDetected,

    #[error("exceeded maximum step count")]
    MaxStepsExceeded,

    #[error("run cancelled by caller")]
    Cancelled,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NoFormsDetected => ErrorKind::Detection,
            EngineError::Submission(_) => ErrorKind::Submission,
            EngineError::Navigation(_) => ErrorKind::Navigation,
            EngineError::DriverTimeout(_) => ErrorKind::DriverTimeout,
            EngineError::Interaction { .. } => ErrorKind::Interaction,
            EngineError::CaptchaDetected => ErrorKind::CaptchaDetected,
            EngineError::MaxStepsExceeded => ErrorKind::MaxStepsExceeded,
            EngineError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Whether the RECOVER path may retry the originating state.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::Navigation(_) | EngineError::DriverTimeout(_)
        )
    }
}

impl From<DriverError> for EngineError {
    fn from(e: DriverError) -> Self {
        match e {
            DriverError::Timeout { .. } => EngineError::DriverTimeout(e.to_string()),
            other => EngineError::Navigation(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
