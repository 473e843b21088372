//! End-to-end workflow tests over a scripted in-memory browser driver.
//!
//! Each scenario is a small graph of page snapshots with click transitions;
//! the driver records every primitive call so tests can assert what the
//! engine actually did to the page.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use formpilot::detector::{PageSnapshot, RawClickable, RawElement, RawForm};
use formpilot::error::DriverError;
use formpilot::models::{AutomationRun, RunState, UserDataRecord};
use formpilot::{BrowserDriver, EngineConfig, ErrorKind, WorkflowEngine};

struct MockState {
    current: String,
    /// Pages keyed by URL.
    pages: HashMap<String, PageSnapshot>,
    /// (page URL, clicked selector) -> destination URL.
    transitions: HashMap<(String, String), String>,
    calls: Vec<String>,
    fail_navigations: u32,
}

struct MockDriver {
    state: Mutex<MockState>,
}

/// Route engine tracing through the test harness; `RUST_LOG` controls what
/// shows up on failure output.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

impl MockDriver {
    fn new(start: &str, pages: Vec<PageSnapshot>) -> Self {
        init_tracing();
        let pages: HashMap<String, PageSnapshot> =
            pages.into_iter().map(|p| (p.url.clone(), p)).collect();
        Self {
            state: Mutex::new(MockState {
                current: start.to_string(),
                pages,
                transitions: HashMap::new(),
                calls: Vec::new(),
                fail_navigations: 0,
            }),
        }
    }

    fn on_click(self, page: &str, selector: &str, destination: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .transitions
            .insert((page.to_string(), selector.to_string()), destination.to_string());
        self
    }

    fn failing_navigations(self, count: u32) -> Self {
        self.state.lock().unwrap().fail_navigations = count;
        self
    }

    fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn log(&self, call: String) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl BrowserDriver for MockDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("navigate {url}"));
        if state.fail_navigations > 0 {
            state.fail_navigations -= 1;
            return Err(DriverError::Protocol("connection reset".to_string()));
        }
        state.current = url.to_string();
        Ok(())
    }

    async fn query_snapshot(&self) -> Result<PageSnapshot, DriverError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push("snapshot".to_string());
        let current = state.current.clone();
        state
            .pages
            .get(&current)
            .cloned()
            .ok_or(DriverError::NoPage)
    }

    async fn set_value(&self, selector: &str, text: &str) -> Result<(), DriverError> {
        self.log(format!("set_value {selector}={text}"));
        Ok(())
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<(), DriverError> {
        self.log(format!("select_option {selector}={value}"));
        Ok(())
    }

    async fn set_checked(&self, selector: &str, checked: bool) -> Result<(), DriverError> {
        self.log(format!("set_checked {selector}={checked}"));
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(format!("click {selector}"));
        let key = (state.current.clone(), selector.to_string());
        if let Some(destination) = state.transitions.get(&key).cloned() {
            state.current = destination;
        }
        Ok(())
    }

    async fn attach_file(&self, selector: &str, path: &str) -> Result<(), DriverError> {
        self.log(format!("attach_file {selector}={path}"));
        Ok(())
    }

    async fn submit_form(&self, form_selector: &str) -> Result<(), DriverError> {
        self.log(format!("submit_form {form_selector}"));
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, _t: Duration) -> Result<(), DriverError> {
        self.log(format!("wait_for_selector {selector}"));
        Ok(())
    }

    async fn screenshot(&self) -> Result<String, DriverError> {
        self.log("screenshot".to_string());
        Ok("cGhvdG8=".to_string())
    }
}

fn input(selector: &str, input_type: &str, name: &str, label: &str) -> RawElement {
    RawElement {
        tag: "input".to_string(),
        selector: selector.to_string(),
        input_type: Some(input_type.to_string()),
        name: Some(name.to_string()),
        label_for_text: Some(label.to_string()),
        visible: true,
        form_index: Some(0),
        ..Default::default()
    }
}

fn button(selector: &str, text: &str, form_index: Option<usize>) -> RawClickable {
    RawClickable {
        tag: "button".to_string(),
        selector: selector.to_string(),
        text: Some(text.to_string()),
        input_type: Some("submit".to_string()),
        css_classes: None,
        form_index,
    }
}

fn page(url: &str, title: &str, elements: Vec<RawElement>, clickables: Vec<RawClickable>) -> PageSnapshot {
    let forms = if elements.is_empty() {
        Vec::new()
    } else {
        vec![RawForm {
            selector: "#main-form".to_string(),
            action: None,
            method: Some("post".to_string()),
        }]
    };
    PageSnapshot {
        url: url.to_string(),
        title: title.to_string(),
        forms,
        elements,
        clickables,
        frame_urls: Vec::new(),
    }
}

fn test_config() -> EngineConfig {
    EngineConfig {
        fill_backoff: vec![Duration::ZERO],
        post_submit_delay: Duration::ZERO,
        capture_screenshots: false,
        ..EngineConfig::default()
    }
}

fn signup_record() -> UserDataRecord {
    let mut record = UserDataRecord::new();
    record.set("email", "ada@example.test");
    record.set("first_name", "Ada");
    record.set("phone", "+1 555 0100");
    record.set("company", "Analytical Engines Ltd");
    record
}

fn engine_for(driver: Arc<MockDriver>) -> WorkflowEngine {
    WorkflowEngine::new(driver, test_config())
}

fn call_values<'a>(calls: &'a [String], prefix: &str) -> Vec<&'a str> {
    calls
        .iter()
        .filter_map(|c| c.strip_prefix(prefix))
        .collect()
}

#[tokio::test]
async fn signup_form_is_filled_and_submitted() {
    let signup = page(
        "https://example.test/signup",
        "Sign up",
        vec![
            input("#email", "email", "email", "Email"),
            input("#first", "text", "first_name", "First name"),
            input("#password", "password", "password", "Password"),
            input("#confirm", "password", "confirm_password", "Confirm password"),
            RawElement {
                required: true,
                ..input("#terms", "checkbox", "terms", "I accept the terms")
            },
        ],
        vec![button("#submit", "Sign up", Some(0))],
    );
    let done = page("https://example.test/welcome", "Thank you", vec![], vec![]);

    let driver = Arc::new(
        MockDriver::new("about:blank", vec![signup, done]).on_click(
            "https://example.test/signup",
            "#submit",
            "https://example.test/welcome",
        ),
    );
    let engine = engine_for(Arc::clone(&driver));
    let mut run = AutomationRun::new("https://example.test/signup", signup_record());

    let report = engine.execute(&mut run).await;

    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(report.state, RunState::Complete);
    assert_eq!(report.fields_filled, 5);
    assert_eq!(report.forms_detected, 1);
    assert_eq!(report.steps_completed.len(), 1);
    assert!(report.outcome_confidence >= 0.9);

    let calls = driver.calls();
    assert!(calls.contains(&"set_value #email=ada@example.test".to_string()));
    assert!(calls.contains(&"set_checked #terms=true".to_string()));

    // Every fill waits for its target to be attached first.
    let wait = calls
        .iter()
        .position(|c| c == "wait_for_selector #email")
        .expect("wait before fill");
    let fill = calls
        .iter()
        .position(|c| c == "set_value #email=ada@example.test")
        .unwrap();
    assert!(wait < fill);

    // Password and confirmation receive the same generated value.
    let password = call_values(&calls, "set_value #password=");
    let confirm = call_values(&calls, "set_value #confirm=");
    assert_eq!(password.len(), 1);
    assert_eq!(password, confirm);
    assert!(password[0].len() >= 16);
}

#[tokio::test]
async fn multi_step_wizard_completes_every_step() {
    let step1 = page(
        "https://example.test/apply",
        "Application - step 1",
        vec![input("#email", "email", "email", "Email")],
        vec![button("#next1", "Next", Some(0))],
    );
    let step2 = page(
        "https://example.test/apply/2",
        "Application - step 2",
        vec![input("#phone", "tel", "phone", "Phone number")],
        vec![button("#next2", "Continue", Some(0))],
    );
    let step3 = page(
        "https://example.test/apply/3",
        "Application - step 3",
        vec![input("#company", "text", "company", "Company")],
        vec![button("#finish", "Submit application", Some(0))],
    );
    let done = page(
        "https://example.test/apply/done",
        "Application received",
        vec![],
        vec![],
    );

    let driver = Arc::new(
        MockDriver::new("about:blank", vec![step1, step2, step3, done])
            .on_click("https://example.test/apply", "#next1", "https://example.test/apply/2")
            .on_click("https://example.test/apply/2", "#next2", "https://example.test/apply/3")
            .on_click("https://example.test/apply/3", "#finish", "https://example.test/apply/done"),
    );
    let engine = engine_for(Arc::clone(&driver));
    let mut run = AutomationRun::new("https://example.test/apply", signup_record());

    let report = engine.execute(&mut run).await;

    assert!(report.success, "errors: {:?}", report.errors);
    // Two wizard steps plus the final submission.
    assert_eq!(report.steps_completed.len(), 3);
    assert_eq!(report.fields_filled, 3);

    let calls = driver.calls();
    assert!(calls.contains(&"set_value #phone=+1 555 0100".to_string()));
    assert!(calls.contains(&"click #finish".to_string()));
}

#[tokio::test]
async fn entry_point_is_clicked_when_no_form_is_visible() {
    let landing = page(
        "https://example.test/",
        "Welcome",
        vec![],
        vec![
            RawClickable {
                tag: "a".to_string(),
                selector: "#pricing".to_string(),
                text: Some("Pricing".to_string()),
                input_type: None,
                css_classes: None,
                form_index: None,
            },
            RawClickable {
                tag: "a".to_string(),
                selector: "#signup-link".to_string(),
                text: Some("Sign up".to_string()),
                input_type: None,
                css_classes: None,
                form_index: None,
            },
        ],
    );
    let signup = page(
        "https://example.test/signup",
        "Sign up",
        vec![input("#email", "email", "email", "Email")],
        vec![button("#submit", "Create account", Some(0))],
    );
    let done = page("https://example.test/welcome", "Success", vec![], vec![]);

    let driver = Arc::new(
        MockDriver::new("about:blank", vec![landing, signup, done])
            .on_click("https://example.test/", "#signup-link", "https://example.test/signup")
            .on_click("https://example.test/signup", "#submit", "https://example.test/welcome"),
    );
    let engine = engine_for(Arc::clone(&driver));
    let mut run = AutomationRun::new("https://example.test/", signup_record());

    let report = engine.execute(&mut run).await;

    assert!(report.success, "errors: {:?}", report.errors);
    assert!(driver.calls().contains(&"click #signup-link".to_string()));
}

#[tokio::test]
async fn step_loop_is_bounded_by_max_steps() {
    // The page re-renders itself on every "Next" click and never finishes.
    let treadmill = page(
        "https://example.test/loop",
        "Step",
        vec![input("#email", "email", "email", "Email")],
        vec![button("#next", "Next", Some(0))],
    );

    let driver = Arc::new(MockDriver::new("about:blank", vec![treadmill]));
    let engine = engine_for(Arc::clone(&driver));
    let mut run = AutomationRun::new("https://example.test/loop", signup_record());

    let report = engine.execute(&mut run).await;

    assert!(!report.success);
    assert_eq!(report.state, RunState::Failed);
    assert_eq!(report.steps_completed.len(), 10);
    assert!(report
        .errors
        .iter()
        .any(|e| e.kind == ErrorKind::MaxStepsExceeded));
}

#[tokio::test]
async fn captcha_blocks_the_run_without_further_interaction() {
    let mut walled = page(
        "https://example.test/signup",
        "Sign up",
        vec![input("#email", "email", "email", "Email")],
        vec![button("#submit", "Sign up", Some(0))],
    );
    walled.elements.push(RawElement {
        tag: "div".to_string(),
        selector: "div.g-recaptcha".to_string(),
        css_classes: Some("g-recaptcha".to_string()),
        visible: true,
        ..Default::default()
    });

    let driver = Arc::new(MockDriver::new("about:blank", vec![walled]));
    let config = EngineConfig {
        capture_screenshots: true,
        ..test_config()
    };
    let engine = WorkflowEngine::new(Arc::clone(&driver) as Arc<dyn BrowserDriver>, config);
    let mut run = AutomationRun::new("https://example.test/signup", signup_record());

    let report = engine.execute(&mut run).await;

    assert!(!report.success);
    assert_eq!(report.state, RunState::Blocked);
    assert!(report
        .errors
        .iter()
        .any(|e| e.kind == ErrorKind::CaptchaDetected));

    // Nothing touches the page after the captcha observation, screenshots
    // included.
    let calls = driver.calls();
    assert_eq!(calls.last().map(String::as_str), Some("snapshot"));
    assert!(!calls.iter().any(|c| c.starts_with("set_value")));
    assert!(!calls.iter().any(|c| c == "screenshot"));
}

#[tokio::test]
async fn cancellation_fails_the_run_before_the_next_transition() {
    let driver = Arc::new(MockDriver::new("about:blank", vec![]));
    let engine = engine_for(Arc::clone(&driver));
    engine.cancel_token().cancel();

    let mut run = AutomationRun::new("https://example.test/", signup_record());
    let report = engine.execute(&mut run).await;

    assert!(!report.success);
    assert_eq!(report.state, RunState::Failed);
    assert!(report.errors.iter().any(|e| e.kind == ErrorKind::Cancelled));
    assert!(driver.calls().is_empty());
}

#[tokio::test]
async fn transient_navigation_failures_are_recovered() {
    let signup = page(
        "https://example.test/signup",
        "Sign up",
        vec![input("#email", "email", "email", "Email")],
        vec![button("#submit", "Sign up", Some(0))],
    );
    let done = page("https://example.test/welcome", "Thank you", vec![], vec![]);

    let driver = Arc::new(
        MockDriver::new("about:blank", vec![signup, done])
            .on_click(
                "https://example.test/signup",
                "#submit",
                "https://example.test/welcome",
            )
            .failing_navigations(2),
    );
    let engine = engine_for(Arc::clone(&driver));
    let mut run = AutomationRun::new("https://example.test/signup", signup_record());

    let report = engine.execute(&mut run).await;

    assert!(report.success, "errors: {:?}", report.errors);
    // Both transient failures stay on the record.
    assert_eq!(
        report
            .errors
            .iter()
            .filter(|e| e.kind == ErrorKind::Navigation)
            .count(),
        2
    );
}

#[tokio::test]
async fn required_field_without_data_is_a_warning_not_a_failure() {
    let signup = page(
        "https://example.test/signup",
        "Sign up",
        vec![
            input("#email", "email", "email", "Email"),
            RawElement {
                required: true,
                label_for_text: Some("Referral code".to_string()),
                ..input("#referral", "text", "referral_code", "Referral code")
            },
        ],
        vec![button("#submit", "Sign up", Some(0))],
    );
    let done = page("https://example.test/welcome", "Thank you", vec![], vec![]);

    let driver = Arc::new(MockDriver::new("about:blank", vec![signup, done]).on_click(
        "https://example.test/signup",
        "#submit",
        "https://example.test/welcome",
    ));
    let engine = engine_for(Arc::clone(&driver));
    let mut run = AutomationRun::new("https://example.test/signup", signup_record());

    let report = engine.execute(&mut run).await;

    assert!(report.success, "errors: {:?}", report.errors);
    assert_eq!(report.fields_filled, 1);
    assert!(report
        .errors
        .iter()
        .any(|e| e.kind == ErrorKind::MappingWarning && e.field_id.as_deref() == Some("#referral")));
}
