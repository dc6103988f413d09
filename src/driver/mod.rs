//! Browser capability used by the reservation and cancellation workflows.
//
// Workflows never touch a browser library directly. They talk to a `PageDriver`, which the
// Chrome adapter implements over a live tab and the fixture implements over an in-memory DOM.

use async_trait::async_trait;
use futures::FutureExt;
use log::{info, warn};
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

#[cfg(feature = "chrome")]
pub mod chrome;
pub mod fixture;

/// Handle to an element on the current page.
///
/// Elements are addressed by the selector that found them and their position among that
/// selector's matches, so a handle stays valid as long as the page keeps the same order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef {
    pub selector: String,
    pub index: usize,
}

impl ElementRef {
    pub fn new(selector: impl Into<String>, index: usize) -> Self {
        Self { selector: selector.into(), index }
    }
}

/// Faults reported by a `PageDriver`
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("Timed out after {}s waiting for '{}'", .timeout.as_secs_f64(), .selector)]
    Timeout { selector: String, timeout: Duration },
    #[error("Element '{0}' not found")]
    NotFound(String),
    #[error("Element '{0}' is in an invalid state and cannot be modified")]
    InvalidState(String),
    #[error("Browser session error: {0}")]
    Session(String),
}

impl DriverError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Timeout { .. })
    }
}

/// Everything a workflow needs from a browser session
#[async_trait]
pub trait PageDriver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<(), DriverError>;

    /// Wait until the selector matches at least one element
    async fn wait_until_present(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementRef, DriverError>;

    /// Wait until the selector matches an element that is not disabled
    async fn wait_until_clickable(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementRef, DriverError>;

    /// Wait until any of the selectors matches and return the position of the first that does
    async fn wait_for_any(
        &self,
        selectors: &[&str],
        timeout: Duration,
    ) -> Result<usize, DriverError>;

    /// All current matches, empty if there are none
    async fn find_all(&self, selector: &str) -> Result<Vec<ElementRef>, DriverError>;

    async fn text(&self, element: &ElementRef) -> Result<String, DriverError>;

    async fn attribute(
        &self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>, DriverError>;

    async fn is_disabled(&self, element: &ElementRef) -> Result<bool, DriverError> {
        Ok(self.attribute(element, "disabled").await?.is_some())
    }

    async fn click(&self, element: &ElementRef) -> Result<(), DriverError>;

    async fn type_text(&self, element: &ElementRef, text: &str) -> Result<(), DriverError>;

    async fn current_url(&self) -> Result<String, DriverError>;

    async fn close(&self) -> Result<(), DriverError>;
}

/// Opens one exclusive browser session per workflow run
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Driver: PageDriver;

    async fn open(&self) -> anyhow::Result<Self::Driver>;
}

/// Run `work` against an open session and close the session afterwards, whatever happened.
///
/// A panic inside `work` is caught and returned as `Err` with its message.
pub async fn supervise<D, F, T>(driver: &D, run_id: &str, work: F) -> Result<T, String>
where
    D: PageDriver + ?Sized,
    F: Future<Output = T>,
{
    let result =
        AssertUnwindSafe(work).catch_unwind().await.map_err(|payload| panic_message(&payload));

    match driver.close().await {
        Ok(()) => info!("[{}] Browser session closed.", run_id),
        Err(e) => warn!("[{}] Failed to close browser session: {}", run_id, e),
    }

    result
}

fn panic_message(payload: &Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
