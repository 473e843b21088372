pub mod chromium;

pub use chromium::ChromiumDriver;

use async_trait::async_trait;
use std::time::Duration;

use crate::detector::PageSnapshot;
use crate::error::DriverError;

/// Async boundary to the browser. The engine only speaks this trait; tests
/// drive it with a scripted implementation and production uses
/// [`ChromiumDriver`].
///
/// Every call may suspend and may fail with a timeout or protocol error;
/// the engine decides what is recoverable.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// Extract the current page state (forms, fields, clickables, frames).
    async fn query_snapshot(&self) -> Result<PageSnapshot, DriverError>;

    /// Replace the value of a text-bearing input and fire input/change events.
    async fn set_value(&self, selector: &str, text: &str) -> Result<(), DriverError>;

    /// Select a dropdown option by value attribute.
    async fn select_option(&self, selector: &str, value: &str) -> Result<(), DriverError>;

    /// Check or uncheck a checkbox/radio input.
    async fn set_checked(&self, selector: &str, checked: bool) -> Result<(), DriverError>;

    async fn click(&self, selector: &str) -> Result<(), DriverError>;

    /// Attach a local file to a file input.
    async fn attach_file(&self, selector: &str, path: &str) -> Result<(), DriverError>;

    /// DOM-level form submission fallback for when no submit control is found.
    async fn submit_form(&self, form_selector: &str) -> Result<(), DriverError>;

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<(), DriverError>;

    /// Base64-encoded PNG of the current viewport.
    async fn screenshot(&self) -> Result<String, DriverError>;
}
