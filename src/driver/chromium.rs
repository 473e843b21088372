use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::Page;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::detector::{parse_snapshot, PageSnapshot, SNAPSHOT_SCRIPT};
use crate::error::DriverError;

use super::BrowserDriver;

const LAUNCH_TIMEOUT: Duration = Duration::from_secs(30);
const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Browser driver over chromiumoxide (CDP). One driver owns one browser
/// instance and one page; runs never share a driver.
pub struct ChromiumDriver {
    browser: Mutex<Option<Browser>>,
    page: Mutex<Option<Page>>,
    navigation_timeout: Duration,
}

impl ChromiumDriver {
    /// Launch a browser with a blank page. Automation-detection flags are
    /// disabled the same way interactive sessions disable them.
    pub async fn launch(headless: bool, navigation_timeout: Duration) -> Result<Self, DriverError> {
        let mut config = BrowserConfig::builder().window_size(1280, 720);
        if !headless {
            config = config.with_head();
        }
        config = config
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-default-apps")
            .arg("--disable-extensions");

        let config = config.build().map_err(DriverError::Protocol)?;

        let (browser, mut handler) = timeout(LAUNCH_TIMEOUT, Browser::launch(config))
            .await
            .map_err(|_| DriverError::Timeout {
                what: "browser launch".to_string(),
                timeout_ms: LAUNCH_TIMEOUT.as_millis() as u64,
            })?
            .map_err(DriverError::protocol)?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                tracing::trace!("browser event: {:?}", event);
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(DriverError::protocol)?;

        Ok(Self {
            browser: Mutex::new(Some(browser)),
            page: Mutex::new(Some(page)),
            navigation_timeout,
        })
    }

    async fn page(&self) -> Result<Page, DriverError> {
        self.page
            .lock()
            .await
            .as_ref()
            .cloned()
            .ok_or(DriverError::NoPage)
    }

    pub async fn close(&self) {
        if let Some(page) = self.page.lock().await.take() {
            let _ = page.close().await;
        }
        if let Some(mut browser) = self.browser.lock().await.take() {
            let _ = browser.close().await;
        }
        tracing::debug!("browser closed");
    }

    /// Set a property through JS and dispatch the events frameworks listen
    /// for. Direct CDP typing is slower and misses React-style controlled
    /// inputs that only honor input events.
    async fn eval_on(&self, selector: &str, body: &str) -> Result<(), DriverError> {
        let page = self.page().await?;
        let script = format!(
            r#"
            (() => {{
                const el = document.querySelector({selector});
                if (!el) return false;
                {body}
                return true;
            }})()
            "#,
            selector = serde_json::to_string(selector).unwrap_or_default(),
            body = body,
        );
        let found = page
            .evaluate(script)
            .await
            .map_err(DriverError::protocol)?
            .into_value::<bool>()
            .map_err(DriverError::protocol)?;
        if found {
            Ok(())
        } else {
            Err(DriverError::NotFound(selector.to_string()))
        }
    }
}

#[async_trait]
impl BrowserDriver for ChromiumDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let page = self.page().await?;
        timeout(self.navigation_timeout, page.goto(url))
            .await
            .map_err(|_| DriverError::Timeout {
                what: format!("navigate to {}", url),
                timeout_ms: self.navigation_timeout.as_millis() as u64,
            })?
            .map_err(DriverError::protocol)?;
        let _ = timeout(self.navigation_timeout, page.wait_for_navigation()).await;
        Ok(())
    }

    async fn query_snapshot(&self) -> Result<PageSnapshot, DriverError> {
        let page = self.page().await?;
        let value = page
            .evaluate(SNAPSHOT_SCRIPT)
            .await
            .map_err(DriverError::protocol)?
            .into_value::<serde_json::Value>()
            .map_err(DriverError::protocol)?;
        parse_snapshot(&value).map_err(DriverError::protocol)
    }

    async fn set_value(&self, selector: &str, text: &str) -> Result<(), DriverError> {
        let value = serde_json::to_string(text).unwrap_or_default();
        self.eval_on(
            selector,
            &format!(
                r#"
                el.focus();
                el.value = {value};
                el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                "#
            ),
        )
        .await
    }

    async fn select_option(&self, selector: &str, value: &str) -> Result<(), DriverError> {
        let value = serde_json::to_string(value).unwrap_or_default();
        self.eval_on(
            selector,
            &format!(
                r#"
                el.value = {value};
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                "#
            ),
        )
        .await
    }

    async fn set_checked(&self, selector: &str, checked: bool) -> Result<(), DriverError> {
        self.eval_on(
            selector,
            &format!(
                r#"
                el.checked = {checked};
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                "#
            ),
        )
        .await
    }

    async fn click(&self, selector: &str) -> Result<(), DriverError> {
        let page = self.page().await?;
        let element = page
            .find_element(selector)
            .await
            .map_err(|_| DriverError::NotFound(selector.to_string()))?;
        element.click().await.map_err(DriverError::protocol)?;
        Ok(())
    }

    async fn attach_file(&self, selector: &str, path: &str) -> Result<(), DriverError> {
        let page = self.page().await?;
        let element = page
            .find_element(selector)
            .await
            .map_err(|_| DriverError::NotFound(selector.to_string()))?;
        let params = SetFileInputFilesParams::builder()
            .file(path.to_string())
            .node_id(element.node_id)
            .build()
            .map_err(DriverError::Protocol)?;
        page.execute(params).await.map_err(DriverError::protocol)?;
        Ok(())
    }

    async fn submit_form(&self, form_selector: &str) -> Result<(), DriverError> {
        self.eval_on(
            form_selector,
            "if (el.requestSubmit) { el.requestSubmit(); } else { el.submit(); }",
        )
        .await
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout_after: Duration,
    ) -> Result<(), DriverError> {
        let page = self.page().await?;
        let start = std::time::Instant::now();
        loop {
            if page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if start.elapsed() > timeout_after {
                return Err(DriverError::Timeout {
                    what: format!("selector '{}'", selector),
                    timeout_ms: timeout_after.as_millis() as u64,
                });
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn screenshot(&self) -> Result<String, DriverError> {
        let page = self.page().await?;
        let bytes = page
            .screenshot(
                chromiumoxide::page::ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .build(),
            )
            .await
            .map_err(DriverError::protocol)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}
