//! In-memory page used to exercise the workflows without a browser.
//
// A fixture page is a map from selector to the ordered nodes that selector matches. Clicking a
// node can reveal or remove other nodes and change the current URL, which is enough to
// model the multi-step reservation and cancellation pages.

use super::{DriverError, ElementRef, PageDriver, SessionFactory};
use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// What happens to the page when a node is clicked
#[derive(Debug, Clone)]
pub enum ClickEffect {
    Reveal { selector: String, node: FixtureNode },
    Remove(String),
    Navigate(String),
}

#[derive(Debug, Clone, Default)]
pub struct FixtureNode {
    pub text: String,
    pub attributes: HashMap<String, String>,
    pub read_only: bool,
    pub on_click: Vec<ClickEffect>,
}

impl FixtureNode {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), ..Default::default() }
    }

    pub fn disabled(self) -> Self {
        self.attr("disabled", "true")
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attributes.insert(name.to_string(), value.to_string());
        self
    }

    /// Typing into the node fails
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn reveals(mut self, selector: &str, node: FixtureNode) -> Self {
        self.on_click.push(ClickEffect::Reveal { selector: selector.to_string(), node });
        self
    }

    pub fn removes(mut self, selector: &str) -> Self {
        self.on_click.push(ClickEffect::Remove(selector.to_string()));
        self
    }

    pub fn navigates_to(mut self, url: &str) -> Self {
        self.on_click.push(ClickEffect::Navigate(url.to_string()));
        self
    }

    fn is_disabled(&self) -> bool {
        self.attributes.contains_key("disabled")
    }
}

/// Calls a workflow made against the fixture, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverCall {
    Navigate(String),
    Click(ElementRef),
    Type(ElementRef, String),
    Close,
}

#[derive(Debug, Default)]
struct FixtureState {
    nodes: HashMap<String, Vec<FixtureNode>>,
    url: String,
    keep_url: bool,
    calls: Vec<DriverCall>,
    closed: bool,
}

/// Cloning a `FixtureDriver` shares the same page, so a test can keep a handle for inspection
#[derive(Debug, Clone, Default)]
pub struct FixtureDriver {
    state: Arc<Mutex<FixtureState>>,
}

impl FixtureDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node matched by `selector`, after any existing matches
    pub fn with(self, selector: &str, node: FixtureNode) -> Self {
        self.lock().nodes.entry(selector.to_string()).or_default().push(node);
        self
    }

    /// Report `url` as the current URL, ignoring later navigation
    pub fn with_url(self, url: &str) -> Self {
        {
            let mut state = self.lock();
            state.url = url.to_string();
            state.keep_url = true;
        }
        self
    }

    pub fn calls(&self) -> Vec<DriverCall> {
        self.lock().calls.clone()
    }

    pub fn clicks(&self) -> Vec<ElementRef> {
        self.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                DriverCall::Click(el) => Some(el.clone()),
                _ => None,
            })
            .collect()
    }

    /// Text typed into the first node matched by `selector`
    pub fn typed_value(&self, selector: &str) -> Option<String> {
        self.lock().nodes.get(selector)?.first()?.attributes.get("value").cloned()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn lock(&self) -> MutexGuard<'_, FixtureState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_node<T>(
        &self,
        element: &ElementRef,
        f: impl FnOnce(&mut FixtureNode) -> Result<T, DriverError>,
    ) -> Result<T, DriverError> {
        let mut state = self.lock();
        let node = state
            .nodes
            .get_mut(&element.selector)
            .and_then(|nodes| nodes.get_mut(element.index))
            .ok_or_else(|| DriverError::NotFound(element.selector.clone()))?;
        f(node)
    }

    fn first_match(&self, selector: &str, clickable: bool) -> Option<ElementRef> {
        let state = self.lock();
        let nodes = state.nodes.get(selector)?;
        nodes
            .iter()
            .position(|node| !clickable || !node.is_disabled())
            .map(|index| ElementRef::new(selector, index))
    }
}

#[async_trait]
impl PageDriver for FixtureDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let mut state = self.lock();
        state.calls.push(DriverCall::Navigate(url.to_string()));
        if !state.keep_url {
            state.url = url.to_string();
        }
        Ok(())
    }

    async fn wait_until_present(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementRef, DriverError> {
        self.first_match(selector, false)
            .ok_or_else(|| DriverError::Timeout { selector: selector.to_string(), timeout })
    }

    async fn wait_until_clickable(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementRef, DriverError> {
        self.first_match(selector, true)
            .ok_or_else(|| DriverError::Timeout { selector: selector.to_string(), timeout })
    }

    async fn wait_for_any(
        &self,
        selectors: &[&str],
        timeout: Duration,
    ) -> Result<usize, DriverError> {
        let state = self.lock();
        selectors
            .iter()
            .position(|sel| state.nodes.get(*sel).is_some_and(|nodes| !nodes.is_empty()))
            .ok_or_else(|| DriverError::Timeout { selector: selectors.join(" | "), timeout })
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<ElementRef>, DriverError> {
        let count = self.lock().nodes.get(selector).map_or(0, Vec::len);
        Ok((0..count).map(|index| ElementRef::new(selector, index)).collect())
    }

    async fn text(&self, element: &ElementRef) -> Result<String, DriverError> {
        self.with_node(element, |node| Ok(node.text.clone()))
    }

    async fn attribute(
        &self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        self.with_node(element, |node| Ok(node.attributes.get(name).cloned()))
    }

    async fn click(&self, element: &ElementRef) -> Result<(), DriverError> {
        let effects = self.with_node(element, |node| {
            if node.is_disabled() {
                return Err(DriverError::InvalidState(element.selector.clone()));
            }
            Ok(node.on_click.clone())
        })?;

        let mut state = self.lock();
        state.calls.push(DriverCall::Click(element.clone()));
        for effect in effects {
            match effect {
                ClickEffect::Reveal { selector, node } => {
                    state.nodes.entry(selector).or_default().push(node)
                }
                ClickEffect::Remove(selector) => {
                    state.nodes.remove(&selector);
                }
                ClickEffect::Navigate(url) => state.url = url,
            }
        }
        Ok(())
    }

    async fn type_text(&self, element: &ElementRef, text: &str) -> Result<(), DriverError> {
        self.with_node(element, |node| {
            if node.read_only {
                return Err(DriverError::InvalidState(element.selector.clone()));
            }
            node.attributes.entry("value".to_string()).or_default().push_str(text);
            Ok(())
        })?;
        self.lock().calls.push(DriverCall::Type(element.clone(), text.to_string()));
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.lock().url.clone())
    }

    async fn close(&self) -> Result<(), DriverError> {
        let mut state = self.lock();
        state.calls.push(DriverCall::Close);
        state.closed = true;
        Ok(())
    }
}

type PageBuilder = Box<dyn Fn() -> FixtureDriver + Send + Sync>;

/// Hands out a freshly built fixture page for every session
pub struct FixtureSessions {
    build: PageBuilder,
    open_error: Option<String>,
    opened: Mutex<Vec<FixtureDriver>>,
}

impl FixtureSessions {
    pub fn new(build: impl Fn() -> FixtureDriver + Send + Sync + 'static) -> Self {
        Self { build: Box::new(build), open_error: None, opened: Mutex::new(Vec::new()) }
    }

    /// Every page is a clone of `driver`, sharing its state
    pub fn shared(driver: FixtureDriver) -> Self {
        Self::new(move || driver.clone())
    }

    /// Sessions that fail to start
    pub fn failing(reason: &str) -> Self {
        let mut sessions = Self::new(FixtureDriver::new);
        sessions.open_error = Some(reason.to_string());
        sessions
    }

    /// Every page handed out so far
    pub fn opened(&self) -> Vec<FixtureDriver> {
        self.opened.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).clone()
    }
}

#[async_trait]
impl SessionFactory for FixtureSessions {
    type Driver = FixtureDriver;

    async fn open(&self) -> anyhow::Result<FixtureDriver> {
        if let Some(reason) = &self.open_error {
            return Err(anyhow!(reason.clone()));
        }
        let driver = (self.build)();
        self.opened.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(driver.clone());
        Ok(driver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_click_reveals_and_navigates() {
        let driver = FixtureDriver::new().with(
            "//button[@id='go']",
            FixtureNode::new("Go").reveals("//p", FixtureNode::new("done")).navigates_to("https://x/y"),
        );
        let button = driver.wait_until_clickable("//button[@id='go']", Duration::ZERO).await.unwrap();
        assert!(driver.find_all("//p").await.unwrap().is_empty());

        driver.click(&button).await.unwrap();

        let revealed = driver.find_all("//p").await.unwrap();
        assert_eq!(revealed.len(), 1);
        assert_eq!(driver.text(&revealed[0]).await.unwrap(), "done");
        assert_eq!(driver.current_url().await.unwrap(), "https://x/y");
    }

    #[tokio::test]
    async fn test_disabled_nodes_are_not_clickable() {
        let driver = FixtureDriver::new().with("//b", FixtureNode::new("x").disabled());
        assert!(driver.wait_until_present("//b", Duration::ZERO).await.is_ok());
        let err = driver.wait_until_clickable("//b", Duration::ZERO).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(driver.is_disabled(&ElementRef::new("//b", 0)).await.unwrap());
    }

    #[tokio::test]
    async fn test_read_only_input_rejects_typing() {
        let driver = FixtureDriver::new()
            .with("//input[1]", FixtureNode::new(""))
            .with("//input[2]", FixtureNode::new("").read_only());
        driver.type_text(&ElementRef::new("//input[1]", 0), "Jane").await.unwrap();
        let err = driver.type_text(&ElementRef::new("//input[2]", 0), "Doe").await.unwrap_err();
        assert!(matches!(err, DriverError::InvalidState(_)));
        assert_eq!(driver.typed_value("//input[1]"), Some("Jane".to_string()));
    }

    #[tokio::test]
    async fn test_wait_for_any_reports_first_present() {
        let driver = FixtureDriver::new().with("//b", FixtureNode::new("b"));
        assert_eq!(driver.wait_for_any(&["//a", "//b"], Duration::ZERO).await.unwrap(), 1);
        assert!(driver.wait_for_any(&["//a"], Duration::ZERO).await.is_err());
    }
}
