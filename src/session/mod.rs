//! Page sessions: one logical browser with a primary tab and short-lived
//! secondary tabs.
//!
//! Two engines implement [`BrowserSession`]: a Chrome DevTools session for
//! JavaScript-rendered directories (behind the `browser` feature) and a
//! plain HTTP session for static HTML. The walker and enricher only see the
//! trait.

#[cfg(feature = "browser")]
mod chrome;
mod http;
mod scope;
#[cfg(feature = "browser")]
mod stealth;
mod tabs;
pub mod user_agent;

#[cfg(feature = "browser")]
pub use chrome::ChromeSession;
pub use http::HttpSession;
pub use scope::{with_isolated_tab, TabTask};
pub(crate) use tabs::TabSlots;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::Settings;
use crate::sites::{Engine, SiteDescriptor};

/// Handle to an open tab.
pub type TabId = usize;

/// The tab every session starts with.
pub const PRIMARY_TAB: TabId = 0;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("Navigation to {url} timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    #[error("No open tab with id {0}")]
    UnknownTab(TabId),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Tab task panicked: {0}")]
    TaskPanicked(String),

    #[error("Browser support not compiled. Rebuild with: cargo build --features browser")]
    Unsupported,
}

/// A controllable page session.
///
/// Every operation acts on the active tab. `open_tab` navigates a new tab
/// and makes it active; callers switch back explicitly.
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError>;

    /// Current serialized DOM of the active tab.
    async fn content(&mut self) -> Result<String, SessionError>;

    async fn current_url(&mut self) -> Result<String, SessionError>;

    /// Click the last element matching `selector`. Returns false when
    /// nothing matched or the engine cannot click.
    async fn click(&mut self, selector: &str) -> Result<bool, SessionError>;

    /// Scroll the first element matching `container` to its bottom, or the
    /// window when no container is given.
    async fn scroll_to_bottom(&mut self, container: Option<&str>) -> Result<(), SessionError>;

    async fn open_tab(&mut self, url: &str) -> Result<TabId, SessionError>;

    async fn close_tab(&mut self, tab: TabId) -> Result<(), SessionError>;

    async fn switch_to(&mut self, tab: TabId) -> Result<(), SessionError>;

    fn active_tab(&self) -> TabId;

    fn tab_count(&self) -> usize;

    /// Whether page content can change without a navigation. Static
    /// sessions return false, and waiting on them cannot succeed later.
    fn renders_scripts(&self) -> bool {
        true
    }

    /// Close every tab this session opened and release the engine.
    async fn shutdown(&mut self) -> Result<(), SessionError>;
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Start the session a site's engine calls for.
pub async fn open_session(
    site: &SiteDescriptor,
    settings: &Settings,
) -> Result<Box<dyn BrowserSession>, SessionError> {
    let configured = site.user_agent.as_deref().or(settings.user_agent.as_deref());
    match site.engine {
        Engine::Http => {
            let ua = user_agent::resolve_user_agent(configured, user_agent::USER_AGENT);
            let session = HttpSession::new(
                &ua,
                std::time::Duration::from_millis(settings.request_delay_ms),
                settings.timing.load_timeout,
            )?;
            Ok(Box::new(session))
        }
        Engine::Browser => open_browser(configured, settings).await,
    }
}

#[cfg(feature = "browser")]
async fn open_browser(
    configured: Option<&str>,
    settings: &Settings,
) -> Result<Box<dyn BrowserSession>, SessionError> {
    let ua = user_agent::resolve_user_agent(configured, user_agent::BROWSER_USER_AGENT);
    let session = ChromeSession::launch(&settings.browser, ua, settings.timing.load_timeout).await?;
    Ok(Box::new(session))
}

#[cfg(not(feature = "browser"))]
async fn open_browser(
    _configured: Option<&str>,
    _settings: &Settings,
) -> Result<Box<dyn BrowserSession>, SessionError> {
    Err(SessionError::Unsupported)
}
