//! Chrome DevTools session.
//!
//! Launches a local Chrome (or attaches to one over `remote_url`) with the
//! usual automation fingerprints removed, and maps session tabs onto CDP
//! pages.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::NavigateParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::stealth::STEALTH_SCRIPTS;
use super::{BrowserSession, SessionError, TabId, TabSlots, PRIMARY_TAB};
use crate::config::{BrowserEngineConfig, BrowserEngineType};

const CHROME_PATHS: &[&str] = &[
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
    "/opt/google/chrome/google-chrome",
];

const READY_SCRIPT: &str = r#"
    new Promise((resolve) => {
        if (document.readyState === 'complete' || document.readyState === 'interactive') {
            resolve(document.readyState);
        } else {
            document.addEventListener('DOMContentLoaded', () => resolve(document.readyState));
        }
    })
"#;

const SCROLL_WINDOW_SCRIPT: &str =
    "window.scrollTo(0, Math.max(document.body.scrollHeight, document.documentElement.scrollHeight)); true";

fn browser_err(e: impl std::fmt::Display) -> SessionError {
    SessionError::Browser(e.to_string())
}

fn click_script(selector: &str) -> Result<String, SessionError> {
    let quoted = serde_json::to_string(selector).map_err(browser_err)?;
    Ok(format!(
        r#"(() => {{
            const found = document.querySelectorAll({quoted});
            if (found.length === 0) return false;
            const el = found[found.length - 1];
            el.scrollIntoView({{ block: 'center' }});
            el.click();
            return true;
        }})()"#
    ))
}

/// Scroll the first `selector` match to its bottom; false when absent.
fn scroll_container_script(selector: &str) -> Result<String, SessionError> {
    let quoted = serde_json::to_string(selector).map_err(browser_err)?;
    Ok(format!(
        r#"(() => {{
            const el = document.querySelector({quoted});
            if (!el) return false;
            el.scrollTo(0, el.scrollHeight);
            return true;
        }})()"#
    ))
}

fn find_chrome() -> Result<PathBuf, SessionError> {
    for path in CHROME_PATHS {
        let p = std::path::Path::new(path);
        if p.exists() {
            info!("Found Chrome at: {}", path);
            return Ok(p.to_path_buf());
        }
    }

    for cmd in &[
        "google-chrome",
        "google-chrome-stable",
        "chromium",
        "chromium-browser",
    ] {
        if let Ok(output) = std::process::Command::new("which").arg(cmd).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    info!("Found Chrome in PATH: {}", path);
                    return Ok(PathBuf::from(path));
                }
            }
        }
    }

    Err(SessionError::Browser(
        "Chrome/Chromium not found. Install it or set BROWSER_URL to a running instance"
            .to_string(),
    ))
}

fn drain(mut handler: chromiumoxide::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    })
}

pub struct ChromeSession {
    browser: Browser,
    handler: JoinHandle<()>,
    config: BrowserEngineConfig,
    user_agent: String,
    load_timeout: Duration,
    tabs: TabSlots<Page>,
    active: TabId,
    remote: bool,
}

impl ChromeSession {
    /// Launch Chrome, or attach when `remote_url` is configured, and open
    /// the primary tab.
    pub async fn launch(
        config: &BrowserEngineConfig,
        user_agent: String,
        load_timeout: Duration,
    ) -> Result<Self, SessionError> {
        let (browser, handler, remote) = match config.remote_url {
            Some(ref url) => {
                let (browser, handler) = Self::connect_remote(config, url).await?;
                (browser, handler, true)
            }
            None => {
                let (browser, handler) = Self::launch_local(config).await?;
                (browser, handler, false)
            }
        };

        let mut session = Self {
            browser,
            handler,
            config: config.clone(),
            user_agent,
            load_timeout,
            tabs: TabSlots::default(),
            active: PRIMARY_TAB,
            remote,
        };
        let page = session.new_page().await?;
        session.tabs.insert(page);
        Ok(session)
    }

    async fn launch_local(
        config: &BrowserEngineConfig,
    ) -> Result<(Browser, JoinHandle<()>), SessionError> {
        info!("Launching browser (headless={})", config.headless);
        let mut builder = BrowserConfig::builder().chrome_executable(find_chrome()?);

        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(ref proxy) = config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-sync")
            .arg("--disable-translate")
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--window-size=1366,900");

        for arg in &config.chrome_args {
            builder = builder.arg(arg);
        }

        let browser_config = builder.build().map_err(|e| {
            SessionError::Browser(format!("Failed to build browser config: {}", e))
        })?;
        let (browser, handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| SessionError::Browser(format!("Failed to launch browser: {}", e)))?;
        Ok((browser, drain(handler)))
    }

    async fn connect_remote(
        config: &BrowserEngineConfig,
        url: &str,
    ) -> Result<(Browser, JoinHandle<()>), SessionError> {
        info!("Connecting to remote browser at {}", url);

        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let version: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .send()
            .await?
            .json()
            .await?;
        let ws_url = version
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                SessionError::Browser("No webSocketDebuggerUrl in response".to_string())
            })?;

        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout: Duration::from_secs(config.timeout),
            ..Default::default()
        };
        let (browser, handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .map_err(|e| {
                SessionError::Browser(format!("Failed to connect to remote browser: {}", e))
            })?;
        Ok((browser, drain(handler)))
    }

    async fn new_page(&self) -> Result<Page, SessionError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(browser_err)?;
        page.execute(SetUserAgentOverrideParams::new(self.user_agent.clone()))
            .await
            .map_err(browser_err)?;
        Ok(page)
    }

    fn page(&self, tab: TabId) -> Result<&Page, SessionError> {
        self.tabs.get(tab)
    }

    async fn load(&self, page: &Page, url: &str) -> Result<(), SessionError> {
        debug!("Navigating to {}", url);
        let params = NavigateParams::builder()
            .url(url)
            .build()
            .map_err(|e| SessionError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        tokio::time::timeout(self.load_timeout, page.execute(params))
            .await
            .map_err(|_| SessionError::Timeout {
                url: url.to_string(),
                secs: self.load_timeout.as_secs(),
            })?
            .map_err(|e| SessionError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        match tokio::time::timeout(self.load_timeout, page.evaluate(READY_SCRIPT.to_string())).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => debug!("Could not check ready state: {}", e),
            Err(_) => warn!("Timeout waiting for ready state on {}", url),
        }

        if self.config.engine == BrowserEngineType::Stealth {
            for script in STEALTH_SCRIPTS {
                if let Err(e) = page.evaluate(script.to_string()).await {
                    debug!("Stealth script skipped: {}", e);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        let page = self.page(self.active)?;
        self.load(page, url).await
    }

    async fn content(&mut self) -> Result<String, SessionError> {
        self.page(self.active)?.content().await.map_err(browser_err)
    }

    async fn current_url(&mut self) -> Result<String, SessionError> {
        Ok(self
            .page(self.active)?
            .url()
            .await
            .map_err(browser_err)?
            .unwrap_or_default())
    }

    async fn click(&mut self, selector: &str) -> Result<bool, SessionError> {
        let script = click_script(selector)?;
        let result = self
            .page(self.active)?
            .evaluate(script)
            .await
            .map_err(browser_err)?;
        Ok(result.into_value::<bool>().unwrap_or(false))
    }

    async fn scroll_to_bottom(&mut self, container: Option<&str>) -> Result<(), SessionError> {
        let page = self.page(self.active)?;
        if let Some(selector) = container {
            let scrolled = page
                .evaluate(scroll_container_script(selector)?)
                .await
                .map_err(browser_err)?
                .into_value::<bool>()
                .unwrap_or(false);
            if scrolled {
                return Ok(());
            }
            debug!("Scroll container '{}' not found; scrolling the window", selector);
        }
        page.evaluate(SCROLL_WINDOW_SCRIPT.to_string())
            .await
            .map_err(browser_err)?;
        Ok(())
    }

    async fn open_tab(&mut self, url: &str) -> Result<TabId, SessionError> {
        let page = self.new_page().await?;
        if let Err(e) = self.load(&page, url).await {
            if let Err(close) = page.close().await {
                debug!("Failed to close tab after error: {}", close);
            }
            return Err(e);
        }
        self.active = self.tabs.insert(page);
        Ok(self.active)
    }

    async fn close_tab(&mut self, tab: TabId) -> Result<(), SessionError> {
        let page = self.tabs.remove(tab)?;
        if self.active == tab {
            self.active = PRIMARY_TAB;
        }
        page.close().await.map_err(browser_err)?;
        Ok(())
    }

    async fn switch_to(&mut self, tab: TabId) -> Result<(), SessionError> {
        let page = self.page(tab)?;
        if let Err(e) = page.bring_to_front().await {
            debug!("bring_to_front failed for tab {}: {}", tab, e);
        }
        self.active = tab;
        Ok(())
    }

    fn active_tab(&self) -> TabId {
        self.active
    }

    fn tab_count(&self) -> usize {
        self.tabs.count()
    }

    async fn shutdown(&mut self) -> Result<(), SessionError> {
        for page in self.tabs.drain() {
            if let Err(e) = page.close().await {
                debug!("Failed to close page: {}", e);
            }
        }
        self.active = PRIMARY_TAB;

        if !self.remote {
            if let Err(e) = self.browser.close().await {
                warn!("Failed to close browser: {}", e);
            }
            if let Err(e) = self.browser.wait().await {
                debug!("Browser process wait failed: {}", e);
            }
        }
        self.handler.abort();
        Ok(())
    }
}
