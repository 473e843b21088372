//! Form understanding and autofill orchestration.
//!
//! Given a target URL and a structured user data record, the engine drives a
//! browser through navigate, detect, map, fill, submit and verify phases,
//! handling multi-step wizards, hidden entry points and captcha walls, and
//! always returns a structured [`models::RunReport`].
//!
//! The pipeline is split so every decision stage is testable without a
//! browser:
//!
//! - [`detector`] turns a page snapshot into [`models::DetectedForm`]s
//! - [`classifier`] assigns each field a semantic [`models::FieldPurpose`]
//! - [`mapper`] deterministically maps record values onto fields
//! - [`fuser`] merges optional AI suggestions into the heuristic plan
//! - [`engine`] runs the workflow state machine over a [`driver::BrowserDriver`]
//! - [`pool`] executes runs concurrently with per-run cancellation

pub mod classifier;
pub mod config;
pub mod detector;
pub mod driver;
pub mod engine;
pub mod error;
pub mod fuser;
pub mod mapper;
pub mod models;
pub mod oracle;
pub mod pool;

pub use classifier::FieldClassifier;
pub use config::EngineConfig;
pub use detector::FormDetector;
pub use driver::{BrowserDriver, ChromiumDriver};
pub use engine::{RunRecorder, WorkflowEngine};
pub use error::{DriverError, EngineError, ErrorKind};
pub use fuser::GuidanceFuser;
pub use mapper::DataMapper;
pub use models::{AutomationRun, RunReport, RunState, UserDataRecord};
pub use pool::{ChromiumDriverFactory, DriverFactory, RunPool};
