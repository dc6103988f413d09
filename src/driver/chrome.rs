//! `PageDriver` over a headless Chrome tab.
//
// headless_chrome is synchronous, so every tab call runs on the blocking pool. Waits poll the
// DOM with XPath until a match shows up or the deadline passes.

use super::{DriverError, ElementRef, PageDriver, SessionFactory};
use crate::config::{BrowserConfig, Config, ProxyConfig};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use headless_chrome::browser::tab::NoElementFound;
use headless_chrome::{Browser, Element, LaunchOptions, Tab};
use log::{debug, info};
use secrecy::ExposeSecret;
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Launches (or connects to) one Chrome instance per session
#[derive(Clone)]
pub struct ChromeSessions {
    browser: BrowserConfig,
    proxy: ProxyConfig,
    page_load: Duration,
}

impl ChromeSessions {
    pub fn new(config: &Config) -> Self {
        Self {
            browser: config.browser.clone(),
            proxy: config.proxy.clone(),
            page_load: config.timeouts.page_load(),
        }
    }

    fn launch(&self) -> anyhow::Result<ChromeDriver> {
        let browser = match &self.browser.remote_debugging_url {
            Some(ws_url) => {
                info!("Connecting to remote browser at {}", ws_url);
                Browser::connect(ws_url.clone()).context("Failed to connect to remote browser")?
            }
            None => {
                let proxy_server = self.proxy.server();
                let mut args: Vec<&OsStr> = vec![OsStr::new("--disable-dev-shm-usage")];
                if self.browser.block_images {
                    args.push(OsStr::new("--blink-settings=imagesEnabled=false"));
                }
                let options: LaunchOptions = LaunchOptions::default_builder()
                    .headless(self.browser.headless)
                    .sandbox(false)
                    .window_size(Some((self.browser.window_width, self.browser.window_height)))
                    .proxy_server(proxy_server.as_deref())
                    .args(args)
                    .build()
                    .map_err(|e| anyhow!("Invalid browser launch options: {}", e))?;
                Browser::new(options).context("Failed to launch Chrome")?
            }
        };

        let tab = browser.new_tab().context("Failed to open browser tab")?;
        tab.set_default_timeout(self.page_load);

        if let Some((username, password)) = self.proxy.credentials() {
            debug!("Enabling proxy authentication for {}", username);
            tab.enable_fetch(None, Some(true))?;
            tab.authenticate(Some(username), Some(password.expose_secret().to_string()))?;
        }

        Ok(ChromeDriver { _browser: browser, tab })
    }
}

#[async_trait]
impl SessionFactory for ChromeSessions {
    type Driver = ChromeDriver;

    async fn open(&self) -> anyhow::Result<ChromeDriver> {
        let sessions = self.clone();
        tokio::task::spawn_blocking(move || sessions.launch())
            .await
            .context("Browser launch task failed")?
    }
}

pub struct ChromeDriver {
    // The browser process lives as long as the driver
    _browser: Browser,
    tab: Arc<Tab>,
}

impl ChromeDriver {
    async fn blocking<T, F>(&self, f: F) -> Result<T, DriverError>
    where
        T: Send + 'static,
        F: FnOnce(&Tab) -> Result<T, DriverError> + Send + 'static,
    {
        let tab = Arc::clone(&self.tab);
        tokio::task::spawn_blocking(move || f(&tab))
            .await
            .map_err(|e| DriverError::Session(e.to_string()))?
    }

    /// Run `f` on the element `element` points at
    async fn on_element<T, F>(&self, element: &ElementRef, f: F) -> Result<T, DriverError>
    where
        T: Send + 'static,
        F: FnOnce(&Element<'_>) -> anyhow::Result<T> + Send + 'static,
    {
        let element = element.clone();
        self.blocking(move |tab| {
            let matches = find_matches(tab, &element.selector)?;
            let node = matches
                .get(element.index)
                .ok_or_else(|| DriverError::NotFound(element.selector.clone()))?;
            f(node).map_err(|e| classify(&element.selector, e))
        })
        .await
    }

    /// Poll until `probe` returns something or `timeout` passes
    async fn poll<T, F>(&self, label: String, timeout: Duration, probe: F) -> Result<T, DriverError>
    where
        T: Send + 'static,
        F: Fn(&Tab) -> Result<Option<T>, DriverError> + Send + Sync + 'static,
    {
        let probe = Arc::new(probe);
        let deadline = Instant::now() + timeout;
        loop {
            let check = Arc::clone(&probe);
            if let Some(found) = self.blocking(move |tab| check(tab)).await? {
                return Ok(found);
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Timeout { selector: label, timeout });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

fn find_matches<'a>(tab: &'a Tab, selector: &str) -> Result<Vec<Element<'a>>, DriverError> {
    no_match_as_empty(tab.find_elements_by_xpath(selector))
}

/// An XPath query with no hits is an empty result; any other DevTools fault is a session error
fn no_match_as_empty<T>(result: anyhow::Result<Vec<T>>) -> Result<Vec<T>, DriverError> {
    match result {
        Ok(found) => Ok(found),
        Err(e) if e.downcast_ref::<NoElementFound>().is_some() => Ok(Vec::new()),
        Err(e) => Err(DriverError::Session(e.to_string())),
    }
}

fn classify(selector: &str, e: anyhow::Error) -> DriverError {
    let message = e.to_string();
    if message.contains("not interactable") || message.contains("read-only") {
        DriverError::InvalidState(selector.to_string())
    } else {
        DriverError::Session(message)
    }
}

#[async_trait]
impl PageDriver for ChromeDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let url = url.to_string();
        self.blocking(move |tab| {
            tab.navigate_to(&url).map_err(|e| DriverError::Session(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn wait_until_present(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementRef, DriverError> {
        let sel = selector.to_string();
        self.poll(selector.to_string(), timeout, move |tab| {
            Ok((!find_matches(tab, &sel)?.is_empty()).then(|| ElementRef::new(sel.as_str(), 0)))
        })
        .await
    }

    async fn wait_until_clickable(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<ElementRef, DriverError> {
        let sel = selector.to_string();
        self.poll(selector.to_string(), timeout, move |tab| {
            Ok(find_matches(tab, &sel)?
                .iter()
                .position(|el| matches!(el.get_attribute_value("disabled"), Ok(None)))
                .map(|index| ElementRef::new(sel.as_str(), index)))
        })
        .await
    }

    async fn wait_for_any(
        &self,
        selectors: &[&str],
        timeout: Duration,
    ) -> Result<usize, DriverError> {
        let owned: Vec<String> = selectors.iter().map(|s| s.to_string()).collect();
        self.poll(selectors.join(" | "), timeout, move |tab| {
            for (index, sel) in owned.iter().enumerate() {
                if !find_matches(tab, sel)?.is_empty() {
                    return Ok(Some(index));
                }
            }
            Ok(None)
        })
        .await
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<ElementRef>, DriverError> {
        let sel = selector.to_string();
        self.blocking(move |tab| {
            let count = find_matches(tab, &sel)?.len();
            Ok((0..count).map(|index| ElementRef::new(sel.as_str(), index)).collect())
        })
        .await
    }

    async fn text(&self, element: &ElementRef) -> Result<String, DriverError> {
        self.on_element(element, |el| el.get_inner_text()).await
    }

    async fn attribute(
        &self,
        element: &ElementRef,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let name = name.to_string();
        self.on_element(element, move |el| el.get_attribute_value(&name)).await
    }

    async fn click(&self, element: &ElementRef) -> Result<(), DriverError> {
        self.on_element(element, |el| el.click().map(|_| ())).await
    }

    async fn type_text(&self, element: &ElementRef, text: &str) -> Result<(), DriverError> {
        let text = text.to_string();
        self.on_element(element, move |el| el.type_into(&text).map(|_| ())).await
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        self.blocking(|tab| Ok(tab.get_url())).await
    }

    async fn close(&self) -> Result<(), DriverError> {
        self.blocking(|tab| {
            tab.close(true).map_err(|e| DriverError::Session(e.to_string()))?;
            Ok(())
        })
        .await
    }
}
