use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::detector::{FormDetector, PageSnapshot};
use crate::driver::BrowserDriver;
use crate::error::{EngineError, ErrorKind};
use crate::fuser::{ActionPlan, GuidanceFuser};
use crate::mapper::DataMapper;
use crate::models::{
    AssignedValue, AutomationRun, DetectedForm, FieldPurpose, FormField, MappedValue, RunReport,
    RunState, TaggedError,
};
use crate::oracle::{AiOracle, AiSuggestion};

use super::heuristics::{self, SubmitCandidate, SubmitKind};
use super::recorder::RunRecorder;

/// Pause between a RECOVER decision and the retried state.
const RECOVER_BACKOFF: Duration = Duration::from_millis(750);

/// Drives one [`AutomationRun`] through the workflow state machine:
///
/// ```text
/// NAVIGATE -> DETECT -> (no forms) SEEK_ENTRY -> DETECT
///                    -> MAP -> FILL -> SUBMIT_STEP -> DETECT (bounded loop)
///                                   -> SUBMIT_FINAL -> VERIFY -> COMPLETE
/// ```
///
/// Recoverable driver failures route through RECOVER back to the originating
/// state with a bounded retry budget. A captcha indicator moves the run to
/// BLOCKED immediately; no driver primitive is invoked after that.
pub struct WorkflowEngine {
    config: EngineConfig,
    driver: Arc<dyn BrowserDriver>,
    oracle: Option<Arc<dyn AiOracle>>,
    detector: FormDetector,
    mapper: DataMapper,
    fuser: GuidanceFuser,
    recorder: Arc<RunRecorder>,
    cancel_token: CancellationToken,
}

impl WorkflowEngine {
    pub fn new(driver: Arc<dyn BrowserDriver>, config: EngineConfig) -> Self {
        let fuser = GuidanceFuser::new(config.fusion_threshold);
        Self {
            config,
            driver,
            oracle: None,
            detector: FormDetector::new(),
            mapper: DataMapper::new(),
            fuser,
            recorder: Arc::new(RunRecorder::new()),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Attach the optional AI advisory oracle. Without it the engine runs
    /// heuristic-only with no behavior change besides lower confidence.
    pub fn with_oracle(mut self, oracle: Arc<dyn AiOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn with_recorder(mut self, recorder: Arc<RunRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    /// Use an externally owned cancellation token, so a pool can cancel the
    /// run without holding the engine.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn recorder(&self) -> Arc<RunRecorder> {
        Arc::clone(&self.recorder)
    }

    /// Token callers use to cancel the run. The engine finishes the current
    /// primitive and fails the run at the next state transition.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Execute the run to a terminal state. Always returns a structured
    /// report with partial progress and the error list; never panics or
    /// bubbles an unhandled error.
    pub async fn execute(&self, run: &mut AutomationRun) -> RunReport {
        let run_id = run.id.clone();
        self.recorder
            .info(&run_id, format!("starting run against {}", run.target_url));

        let mut state = RunState::Navigate;
        let mut recover_budget = self.config.max_recover_retries;
        let mut entry_sought = false;
        let mut snapshot = PageSnapshot::default();
        let mut current_form: Option<DetectedForm> = None;
        let mut current_form_index: Option<usize> = None;
        let mut plan = ActionPlan::default();
        let mut pending_submit: Option<SubmitCandidate> = None;
        let mut submit_fingerprint: Option<u64> = None;

        loop {
            // Cancellation is polled at the top of every transition; the
            // primitive that was in flight has already finished.
            if self.cancel_token.is_cancelled() {
                let err = EngineError::Cancelled;
                run.record_error(TaggedError::new(err.kind(), state, err.to_string()));
                self.recorder.warn(&run_id, "run cancelled by caller");
                run.finish(RunState::Failed);
                break;
            }

            run.state = state;
            self.recorder.state(&run_id, state);

            let outcome: Result<RunState, EngineError> = match state {
                RunState::Navigate => self
                    .driver
                    .navigate(&run.target_url)
                    .await
                    .map(|_| RunState::Detect)
                    .map_err(Into::into),

                RunState::Detect => match self.driver.query_snapshot().await {
                    Err(e) => Err(e.into()),
                    Ok(snap) => {
                        if heuristics::detect_captcha(&snap) {
                            Err(EngineError::CaptchaDetected)
                        } else {
                            if let Some(fp) = submit_fingerprint.take() {
                                if fp == snap.fingerprint() {
                                    self.recorder
                                        .warn(&run_id, "page unchanged after submit");
                                }
                            }
                            snapshot = snap;
                            let forms = self.detector.detect(&snapshot);
                            run.forms_detected = run.forms_detected.max(forms.len() as u32);
                            // Prefer the richest form; first wins ties so
                            // detection stays deterministic.
                            let chosen = forms.into_iter().reduce(|best, f| {
                                if f.fields.len() > best.fields.len() {
                                    f
                                } else {
                                    best
                                }
                            });
                            match chosen {
                                None if entry_sought => Err(EngineError::NoFormsDetected),
                                None => Ok(RunState::SeekEntry),
                                Some(form) => {
                                    current_form_index = snapshot
                                        .forms
                                        .iter()
                                        .position(|raw| raw.selector == form.id);
                                    self.recorder.info(
                                        &run_id,
                                        format!(
                                            "targeting form {} ({} fields)",
                                            form.id,
                                            form.fields.len()
                                        ),
                                    );
                                    current_form = Some(form);
                                    Ok(RunState::Map)
                                }
                            }
                        }
                    }
                },

                RunState::SeekEntry => {
                    entry_sought = true;
                    match heuristics::find_entry_point(&snapshot) {
                        Some(entry) => {
                            self.recorder.info(
                                &run_id,
                                format!(
                                    "no forms visible, clicking entry point {}",
                                    entry.selector
                                ),
                            );
                            match self.driver.click(&entry.selector).await {
                                Ok(()) => {
                                    tokio::time::sleep(self.config.post_submit_delay).await;
                                    Ok(RunState::Detect)
                                }
                                Err(e) => Err(e.into()),
                            }
                        }
                        None => Err(EngineError::NoFormsDetected),
                    }
                }

                RunState::Map => match current_form.as_ref() {
                    // Detect always precedes Map with a chosen form.
                    None => Err(EngineError::NoFormsDetected),
                    Some(form) => {
                        let heuristic = self.mapper.map(&run.record, &form.fields);
                        for field in &form.fields {
                            if field.required && !heuristic.contains(&field.id) {
                                let warning = TaggedError::new(
                                    ErrorKind::MappingWarning,
                                    state,
                                    format!("required field '{}' has no mapped value", field.id),
                                )
                                .for_field(field.id.clone());
                                run.record_error(warning);
                                self.recorder.warn(
                                    &run_id,
                                    format!("required field '{}' unmapped", field.id),
                                );
                            }
                        }
                        let suggestion = self.ask_oracle(run).await;
                        plan = self.fuser.fuse(&heuristic, suggestion.as_ref());
                        self.recorder.info(
                            &run_id,
                            format!(
                                "mapped {} of {} fields (ai: {}, confidence {:.2})",
                                plan.mapping.len(),
                                form.fields.len(),
                                plan.used_ai,
                                plan.confidence
                            ),
                        );
                        Ok(RunState::Fill)
                    }
                },

                RunState::Fill => match current_form.as_ref() {
                    None => Err(EngineError::NoFormsDetected),
                    Some(form) => {
                        let mut filled = 0u32;
                        // Fill in DOM discovery order; later fields may only
                        // exist because earlier ones were set.
                        for field in &form.fields {
                            let Some(entry) = plan.mapping.get(&field.id) else {
                                continue;
                            };
                            match self.fill_with_retries(field, entry).await {
                                Ok(()) => filled += 1,
                                Err(err) => {
                                    self.recorder.warn(&run_id, err.to_string());
                                    run.record_error(
                                        TaggedError::new(err.kind(), state, err.to_string())
                                            .for_field(field.id.clone()),
                                    );
                                }
                            }
                        }
                        // AI-suggested selectors outside the detected field
                        // set are best-effort text fills.
                        let extras: Vec<(String, String)> = plan
                            .mapping
                            .iter()
                            .filter(|(id, _)| form.field(id).is_none())
                            .filter_map(|(id, entry)| match &entry.value {
                                AssignedValue::Text(text) => {
                                    Some((id.clone(), text.clone()))
                                }
                                _ => None,
                            })
                            .collect();
                        for (selector, text) in extras {
                            if self.driver.set_value(&selector, &text).await.is_ok() {
                                filled += 1;
                            } else {
                                self.recorder.debug(
                                    &run_id,
                                    format!("ai-suggested selector '{}' not fillable", selector),
                                );
                            }
                        }
                        run.fields_filled += filled;
                        self.recorder
                            .info(&run_id, format!("filled {} fields", filled));

                        pending_submit =
                            heuristics::find_submit_candidate(&snapshot, current_form_index);
                        match &pending_submit {
                            Some(c) if c.kind == SubmitKind::NextStep => Ok(RunState::SubmitStep),
                            _ => Ok(RunState::SubmitFinal),
                        }
                    }
                },

                RunState::SubmitStep => {
                    if run.step_count >= self.config.max_steps {
                        Err(EngineError::MaxStepsExceeded)
                    } else {
                        match pending_submit.take() {
                            None => Err(EngineError::Submission("no submit control".into())),
                            Some(candidate) => {
                                submit_fingerprint = Some(snapshot.fingerprint());
                                match self.driver.click(&candidate.selector).await {
                                    Ok(()) => {
                                        tokio::time::sleep(self.config.post_submit_delay).await;
                                        run.step_count += 1;
                                        let name = format!(
                                            "step {} via {}",
                                            run.step_count, candidate.selector
                                        );
                                        run.steps_completed.push(name.clone());
                                        self.recorder.step_completed(&run_id, name);
                                        self.capture(run).await;
                                        Ok(RunState::Detect)
                                    }
                                    Err(e) => Err(e.into()),
                                }
                            }
                        }
                    }
                }

                RunState::SubmitFinal => {
                    let clicked = match pending_submit.take() {
                        Some(candidate) => {
                            match self.driver.click(&candidate.selector).await {
                                Ok(()) => Some(candidate.selector),
                                Err(e) => {
                                    self.recorder.warn(
                                        &run_id,
                                        format!("submit click failed: {}", e),
                                    );
                                    None
                                }
                            }
                        }
                        None => None,
                    };
                    let submitted = match clicked {
                        Some(selector) => Ok(selector),
                        // DOM-level fallback: submit the form element itself.
                        None => match current_form.as_ref().and_then(|f| f.form_selector()) {
                            Some(selector) => self
                                .driver
                                .submit_form(selector)
                                .await
                                .map(|_| selector.to_string())
                                .map_err(|e| EngineError::Submission(e.to_string())),
                            None => Err(EngineError::Submission(
                                "no submit control or form element found".into(),
                            )),
                        },
                    };
                    match submitted {
                        Ok(selector) => {
                            tokio::time::sleep(self.config.post_submit_delay).await;
                            run.step_count += 1;
                            let name = format!("final submit via {}", selector);
                            run.steps_completed.push(name.clone());
                            self.recorder.step_completed(&run_id, name);
                            self.capture(run).await;
                            Ok(RunState::Verify)
                        }
                        Err(e) => Err(e),
                    }
                }

                RunState::Verify => match self.driver.query_snapshot().await {
                    Err(e) => Err(e.into()),
                    Ok(snap) => {
                        if heuristics::detect_captcha(&snap) {
                            Err(EngineError::CaptchaDetected)
                        } else if heuristics::detect_success(&snap) {
                            run.outcome_confidence = plan.confidence.max(0.9);
                            Ok(RunState::Complete)
                        } else {
                            // Absent indicators are not failure, only
                            // reduced confidence.
                            self.recorder.warn(
                                &run_id,
                                "no success indicator found after final submit",
                            );
                            run.outcome_confidence = (plan.confidence * 0.5).max(0.1);
                            Ok(RunState::Complete)
                        }
                    }
                },

                // Terminal states and RECOVER never appear here: terminals
                // break the loop below and RECOVER is a detour, not a state
                // this loop dispatches on.
                RunState::Recover
                | RunState::Complete
                | RunState::Failed
                | RunState::Blocked => break,
            };

            match outcome {
                Ok(next) if next.is_terminal() => {
                    self.recorder
                        .info(&run_id, format!("run finished: {}", next.as_str()));
                    run.finish(next);
                    break;
                }
                Ok(next) => {
                    recover_budget = self.config.max_recover_retries;
                    state = next;
                }
                Err(err) if err.is_recoverable() && recover_budget > 0 => {
                    recover_budget -= 1;
                    run.record_error(TaggedError::new(err.kind(), state, err.to_string()));
                    run.state = RunState::Recover;
                    self.recorder.state(&run_id, RunState::Recover);
                    self.recorder.warn(
                        &run_id,
                        format!(
                            "{} (retrying {}, {} retries left)",
                            err,
                            state.as_str(),
                            recover_budget
                        ),
                    );
                    tokio::time::sleep(RECOVER_BACKOFF).await;
                    // Loop re-enters the originating state.
                }
                Err(err) => {
                    run.record_error(TaggedError::new(err.kind(), state, err.to_string()));
                    let terminal = if matches!(err, EngineError::CaptchaDetected) {
                        RunState::Blocked
                    } else {
                        RunState::Failed
                    };
                    self.recorder
                        .error(&run_id, format!("run {}: {}", terminal.as_str(), err));
                    run.finish(terminal);
                    break;
                }
            }
        }

        // Blocked means hands off the page entirely, including screenshots.
        if run.state != RunState::Blocked {
            self.capture(run).await;
        }
        run.report()
    }

    /// One fill primitive with the configured retry/backoff schedule. Each
    /// attempt waits for the selector first, so fields rendered late (after a
    /// dependent field changed the DOM) get their chance within the backoff.
    /// A field that still fails is an interaction error for that field only.
    async fn fill_with_retries(
        &self,
        field: &FormField,
        entry: &MappedValue,
    ) -> Result<(), EngineError> {
        let mut last_error = String::new();
        for delay in &self.config.fill_backoff {
            if !delay.is_zero() {
                tokio::time::sleep(*delay).await;
            }
            if let Err(e) = self
                .driver
                .wait_for_selector(&field.id, self.config.selector_timeout)
                .await
            {
                last_error = e.to_string();
                continue;
            }
            match self.dispatch_primitive(field, entry).await {
                Ok(()) => return Ok(()),
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(EngineError::Interaction {
            field_id: field.id.clone(),
            message: last_error,
        })
    }

    async fn dispatch_primitive(
        &self,
        field: &FormField,
        entry: &MappedValue,
    ) -> Result<(), crate::error::DriverError> {
        use crate::models::TagKind;
        match &entry.value {
            AssignedValue::Text(text) => match field.tag_kind {
                TagKind::Select => self.driver.select_option(&field.id, text).await,
                _ => self.driver.set_value(&field.id, text).await,
            },
            AssignedValue::Option(value) => self.driver.select_option(&field.id, value).await,
            // Radios are clicked rather than property-set so group siblings
            // and change handlers behave like a user interaction.
            AssignedValue::Checked(true) if field.purpose == FieldPurpose::Radio => {
                self.driver.click(&field.id).await
            }
            AssignedValue::Checked(checked) => self.driver.set_checked(&field.id, *checked).await,
            AssignedValue::File(path) => self.driver.attach_file(&field.id, path).await,
        }
    }

    /// Ask the oracle for advice; any failure degrades to heuristic-only.
    async fn ask_oracle(&self, run: &AutomationRun) -> Option<AiSuggestion> {
        let oracle = self.oracle.as_ref()?;
        let screenshot = match self.driver.screenshot().await {
            Ok(s) => s,
            Err(e) => {
                self.recorder
                    .debug(&run.id, format!("screenshot for oracle failed: {}", e));
                return None;
            }
        };
        let goal = format!("Fill and submit the form at {}", run.target_url);
        match oracle.suggest(&screenshot, &goal, &run.record).await {
            Ok(suggestion) => Some(suggestion),
            Err(e) => {
                self.recorder
                    .debug(&run.id, format!("oracle unavailable: {}", e));
                None
            }
        }
    }

    async fn capture(&self, run: &mut AutomationRun) {
        if !self.config.capture_screenshots {
            return;
        }
        if let Ok(shot) = self.driver.screenshot().await {
            run.screenshots.push(shot);
        }
    }
}
