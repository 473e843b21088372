use std::env;
use std::time::Duration;

/// Engine-wide configuration. Defaults are safe for unattended runs; every
/// knob can be overridden from the environment via [`EngineConfig::from_env`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard ceiling on submit-step → detect loop iterations.
    pub max_steps: u32,
    /// Retry budget for the RECOVER path, per originating state.
    pub max_recover_retries: u32,
    /// Backoff schedule for individual fill primitives.
    pub fill_backoff: Vec<Duration>,
    /// Confidence threshold below which AI suggestions are ignored.
    pub fusion_threshold: f64,
    /// Timeout for navigation and page-load waits.
    pub navigation_timeout: Duration,
    /// Timeout for selector discovery waits.
    pub selector_timeout: Duration,
    /// Delay after submit clicks before re-snapshotting the page.
    pub post_submit_delay: Duration,
    /// Maximum concurrent runs in the pool.
    pub max_concurrent: usize,
    pub headless: bool,
    /// Capture a screenshot after each completed workflow state.
    pub capture_screenshots: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 10,
            max_recover_retries: 2,
            fill_backoff: vec![
                Duration::ZERO,
                Duration::from_millis(500),
                Duration::from_millis(1500),
            ],
            fusion_threshold: 0.5,
            navigation_timeout: Duration::from_secs(30),
            selector_timeout: Duration::from_secs(5),
            post_submit_delay: Duration::from_millis(1500),
            max_concurrent: 3,
            headless: true,
            capture_screenshots: true,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_steps: env_parse("FORMPILOT_MAX_STEPS", defaults.max_steps),
            max_recover_retries: env_parse(
                "FORMPILOT_MAX_RECOVER_RETRIES",
                defaults.max_recover_retries,
            ),
            fusion_threshold: env_parse("FORMPILOT_FUSION_THRESHOLD", defaults.fusion_threshold),
            max_concurrent: env_parse("FORMPILOT_MAX_CONCURRENT", defaults.max_concurrent),
            headless: env_parse("FORMPILOT_HEADLESS", defaults.headless),
            ..defaults
        }
    }
}

fn env_parse<T: std::str::FromStr>(var: &str, default: T) -> T {
    env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
