//! Static HTML session over reqwest.
//!
//! Each tab holds the last fetched body. There is no script execution, so
//! clicks never match and scrolling does nothing; sites on this engine
//! paginate by URL.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use super::{BrowserSession, SessionError, TabId, TabSlots, PRIMARY_TAB};

#[derive(Debug, Default)]
struct Tab {
    url: String,
    body: String,
}

pub struct HttpSession {
    client: reqwest::Client,
    delay: Duration,
    timeout: Duration,
    last_request: Option<Instant>,
    tabs: TabSlots<Tab>,
    active: TabId,
}

impl HttpSession {
    pub fn new(user_agent: &str, delay: Duration, timeout: Duration) -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            delay,
            timeout,
            last_request: None,
            tabs: TabSlots::with_primary(Tab::default()),
            active: PRIMARY_TAB,
        })
    }

    async fn throttle(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                tokio::time::sleep(self.delay - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }

    async fn fetch(&mut self, url: &str) -> Result<Tab, SessionError> {
        self.throttle().await;
        debug!("GET {}", url);
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                SessionError::Timeout {
                    url: url.to_string(),
                    secs: self.timeout.as_secs(),
                }
            } else {
                SessionError::Navigation {
                    url: url.to_string(),
                    message: e.to_string(),
                }
            }
        })?;
        let response = response
            .error_for_status()
            .map_err(|e| SessionError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        let final_url = response.url().to_string();
        let body = response.text().await?;
        Ok(Tab {
            url: final_url,
            body,
        })
    }

}

#[async_trait]
impl BrowserSession for HttpSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        let tab = self.fetch(url).await?;
        *self.tabs.get_mut(self.active)? = tab;
        Ok(())
    }

    async fn content(&mut self) -> Result<String, SessionError> {
        Ok(self.tabs.get(self.active)?.body.clone())
    }

    async fn current_url(&mut self) -> Result<String, SessionError> {
        Ok(self.tabs.get(self.active)?.url.clone())
    }

    async fn click(&mut self, _selector: &str) -> Result<bool, SessionError> {
        Ok(false)
    }

    async fn scroll_to_bottom(&mut self, _container: Option<&str>) -> Result<(), SessionError> {
        Ok(())
    }

    async fn open_tab(&mut self, url: &str) -> Result<TabId, SessionError> {
        let tab = self.fetch(url).await?;
        self.active = self.tabs.insert(tab);
        Ok(self.active)
    }

    async fn close_tab(&mut self, tab: TabId) -> Result<(), SessionError> {
        self.tabs.remove(tab)?;
        if self.active == tab {
            self.active = PRIMARY_TAB;
        }
        Ok(())
    }

    async fn switch_to(&mut self, tab: TabId) -> Result<(), SessionError> {
        self.tabs.get(tab)?;
        self.active = tab;
        Ok(())
    }

    fn active_tab(&self) -> TabId {
        self.active
    }

    fn tab_count(&self) -> usize {
        self.tabs.count()
    }

    fn renders_scripts(&self) -> bool {
        false
    }

    async fn shutdown(&mut self) -> Result<(), SessionError> {
        self.tabs.keep_primary();
        self.active = PRIMARY_TAB;
        Ok(())
    }
}
