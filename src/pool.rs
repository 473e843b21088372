use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::driver::{BrowserDriver, ChromiumDriver};
use crate::engine::{RunRecorder, WorkflowEngine};
use crate::error::EngineError;
use crate::models::{AutomationRun, RunReport, RunState, TaggedError, UserDataRecord};
use crate::oracle::AiOracle;

/// Produces a fresh browser driver per run. Runs never share a browser, so
/// cookies and page state cannot leak between them.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn create(&self) -> anyhow::Result<Arc<dyn BrowserDriver>>;
}

/// Launches one Chromium instance per run.
pub struct ChromiumDriverFactory {
    headless: bool,
    navigation_timeout: Duration,
}

impl ChromiumDriverFactory {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            headless: config.headless,
            navigation_timeout: config.navigation_timeout,
        }
    }
}

#[async_trait]
impl DriverFactory for ChromiumDriverFactory {
    async fn create(&self) -> anyhow::Result<Arc<dyn BrowserDriver>> {
        let driver = ChromiumDriver::launch(self.headless, self.navigation_timeout).await?;
        Ok(Arc::new(driver))
    }
}

struct RunEntry {
    cancel: CancellationToken,
    // The run task writes its own report here before signalling done, so any
    // number of waiters can observe it.
    report: Arc<Mutex<Option<RunReport>>>,
    done: watch::Receiver<bool>,
}

/// Owns concurrent run execution: a semaphore caps simultaneous browsers,
/// submissions beyond the cap queue in submission order, and every run is
/// individually cancellable by id.
pub struct RunPool {
    config: EngineConfig,
    factory: Arc<dyn DriverFactory>,
    oracle: Option<Arc<dyn AiOracle>>,
    recorder: Arc<RunRecorder>,
    semaphore: Arc<Semaphore>,
    runs: DashMap<String, RunEntry>,
}

impl RunPool {
    pub fn new(config: EngineConfig, factory: Arc<dyn DriverFactory>) -> Self {
        let semaphore = Arc::new(Semaphore::new(config.max_concurrent));
        Self {
            config,
            factory,
            oracle: None,
            recorder: Arc::new(RunRecorder::new()),
            semaphore,
            runs: DashMap::new(),
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn AiOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    /// Shared recorder for all runs in this pool; subscribe for live events.
    pub fn recorder(&self) -> Arc<RunRecorder> {
        Arc::clone(&self.recorder)
    }

    /// Queue a run and return its id immediately. Execution starts as soon
    /// as a concurrency slot frees up.
    pub fn submit(&self, target_url: impl Into<String>, record: UserDataRecord) -> String {
        let run = AutomationRun::new(target_url, record);
        let run_id = run.id.clone();
        let cancel = CancellationToken::new();

        let semaphore = Arc::clone(&self.semaphore);
        let factory = Arc::clone(&self.factory);
        let oracle = self.oracle.clone();
        let recorder = Arc::clone(&self.recorder);
        let config = self.config.clone();
        let token = cancel.clone();
        let slot: Arc<Mutex<Option<RunReport>>> = Arc::new(Mutex::new(None));
        let task_slot = Arc::clone(&slot);
        let (done_tx, done_rx) = watch::channel(false);

        tokio::spawn(async move {
            let report = async {
                let mut run = run;
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        run.finish(RunState::Failed);
                        return run.report();
                    }
                };
                if token.is_cancelled() {
                    let err = EngineError::Cancelled;
                    run.record_error(TaggedError::new(err.kind(), run.state, err.to_string()));
                    recorder.warn(&run.id, "cancelled while queued");
                    run.finish(RunState::Failed);
                    return run.report();
                }
                let driver = match factory.create().await {
                    Ok(driver) => driver,
                    Err(e) => {
                        let err = EngineError::Navigation(format!("driver launch failed: {e}"));
                        recorder.error(&run.id, err.to_string());
                        run.record_error(TaggedError::new(err.kind(), run.state, err.to_string()));
                        run.finish(RunState::Failed);
                        return run.report();
                    }
                };
                let mut engine = WorkflowEngine::new(driver, config)
                    .with_recorder(recorder)
                    .with_cancel_token(token);
                if let Some(oracle) = oracle {
                    engine = engine.with_oracle(oracle);
                }
                engine.execute(&mut run).await
            }
            .await;
            *task_slot.lock().expect("pool lock poisoned") = Some(report);
            let _ = done_tx.send(true);
        });

        self.runs.insert(
            run_id.clone(),
            RunEntry {
                cancel,
                report: slot,
                done: done_rx,
            },
        );
        run_id
    }

    /// Request cancellation. The run fails at its next state transition;
    /// a queued run fails before touching a browser.
    pub fn cancel(&self, run_id: &str) -> bool {
        match self.runs.get(run_id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Await the run's terminal report. Safe to call from any number of
    /// tasks; every waiter observes the same report. Returns None for
    /// unknown ids, or if the run task panicked before producing one.
    pub async fn wait(&self, run_id: &str) -> Option<RunReport> {
        let (mut done, slot) = {
            let entry = self.runs.get(run_id)?;
            (entry.done.clone(), Arc::clone(&entry.report))
        };
        loop {
            if *done.borrow() {
                break;
            }
            // Sender dropped without signalling means the task panicked;
            // fall through and surface whatever the slot holds (None).
            if done.changed().await.is_err() {
                break;
            }
        }
        let report = slot.lock().expect("pool lock poisoned");
        report.clone()
    }

    /// The finished report, if the run has completed. Does not block.
    pub fn report(&self, run_id: &str) -> Option<RunReport> {
        let entry = self.runs.get(run_id)?;
        let report = entry.report.lock().expect("pool lock poisoned");
        report.clone()
    }

    /// Drop a finished run's bookkeeping.
    pub fn remove(&self, run_id: &str) -> bool {
        self.runs.remove(run_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::PageSnapshot;
    use crate::error::DriverError;

    /// Driver for a page with no forms and no entry points: runs fail fast
    /// with NoFormsDetected.
    struct EmptyPageDriver;

    #[async_trait]
    impl BrowserDriver for EmptyPageDriver {
        async fn navigate(&self, _url: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn query_snapshot(&self) -> Result<PageSnapshot, DriverError> {
            Ok(PageSnapshot::default())
        }
        async fn set_value(&self, _s: &str, _t: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn select_option(&self, _s: &str, _v: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn set_checked(&self, _s: &str, _c: bool) -> Result<(), DriverError> {
            Ok(())
        }
        async fn click(&self, _s: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn attach_file(&self, _s: &str, _p: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn submit_form(&self, _s: &str) -> Result<(), DriverError> {
            Ok(())
        }
        async fn wait_for_selector(&self, _s: &str, _t: Duration) -> Result<(), DriverError> {
            Ok(())
        }
        async fn screenshot(&self) -> Result<String, DriverError> {
            Ok(String::new())
        }
    }

    struct EmptyPageFactory;

    #[async_trait]
    impl DriverFactory for EmptyPageFactory {
        async fn create(&self) -> anyhow::Result<Arc<dyn BrowserDriver>> {
            Ok(Arc::new(EmptyPageDriver))
        }
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            capture_screenshots: false,
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn submitted_run_reaches_a_terminal_report() {
        let pool = RunPool::new(test_config(), Arc::new(EmptyPageFactory));
        let id = pool.submit("https://example.test", UserDataRecord::new());
        let report = pool.wait(&id).await.expect("report");
        assert!(!report.success);
        assert_eq!(report.state, RunState::Failed);
        assert!(report
            .errors
            .iter()
            .any(|e| e.kind == crate::error::ErrorKind::Detection));
        // Report stays retrievable after wait.
        assert!(pool.report(&id).is_some());
        assert!(pool.remove(&id));
        assert!(pool.is_empty());
    }

    #[tokio::test]
    async fn concurrent_waiters_all_observe_the_report() {
        let pool = RunPool::new(test_config(), Arc::new(EmptyPageFactory));
        let id = pool.submit("https://example.test", UserDataRecord::new());
        let (a, b) = tokio::join!(pool.wait(&id), pool.wait(&id));
        let a = a.expect("first waiter");
        let b = b.expect("second waiter");
        assert_eq!(a.run_id, b.run_id);
        assert_eq!(a.state, RunState::Failed);
        assert_eq!(b.state, RunState::Failed);
    }

    #[tokio::test]
    async fn cancel_of_unknown_run_is_rejected() {
        let pool = RunPool::new(test_config(), Arc::new(EmptyPageFactory));
        assert!(!pool.cancel("nope"));
    }

    #[tokio::test]
    async fn runs_queue_beyond_the_concurrency_cap() {
        let config = EngineConfig {
            max_concurrent: 1,
            capture_screenshots: false,
            ..EngineConfig::default()
        };
        let pool = RunPool::new(config, Arc::new(EmptyPageFactory));
        let first = pool.submit("https://example.test/a", UserDataRecord::new());
        let second = pool.submit("https://example.test/b", UserDataRecord::new());
        assert!(pool.wait(&first).await.is_some());
        assert!(pool.wait(&second).await.is_some());
        assert_eq!(pool.len(), 2);
    }
}
