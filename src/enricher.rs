//! Detail page enrichment.
//!
//! A detail page is opened in its own tab through
//! [`with_isolated_tab`](crate::session::with_isolated_tab), so the listing
//! tab keeps its scroll position and pagination state whatever happens on
//! the detail page.

use async_trait::async_trait;
use scraper::Selector;
use tracing::{debug, warn};
use url::Url;

use crate::config::Timing;
use crate::extract::{detail_fields, parse_selector};
use crate::models::FieldValues;
use crate::session::{with_isolated_tab, BrowserSession, SessionError, TabTask};
use crate::sites::DetailConfig;
use crate::wait::{has_match, wait_for_selector};

pub struct DetailEnricher<'a> {
    detail: &'a DetailConfig,
    timing: &'a Timing,
    missing: &'a str,
    anchor: Option<Selector>,
}

impl<'a> DetailEnricher<'a> {
    pub fn new(detail: &'a DetailConfig, timing: &'a Timing, missing: &'a str) -> Self {
        let anchor = detail
            .anchor
            .as_deref()
            .and_then(|sel| match parse_selector(sel) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!("Detail anchor ignored: {}", e);
                    None
                }
            });
        Self {
            detail,
            timing,
            missing,
            anchor,
        }
    }

    /// Fetch `url` in an isolated tab and extract the detail fields.
    ///
    /// Fails only when the tab cannot be opened or read; missing content
    /// yields sentinel-filled fields.
    pub async fn enrich(
        &self,
        session: &mut dyn BrowserSession,
        url: &str,
    ) -> Result<FieldValues, SessionError> {
        with_isolated_tab(session, url, self).await?
    }

    /// Wait for the content anchor, retrying once after a pause.
    async fn await_anchor(&self, session: &mut dyn BrowserSession) -> Result<bool, SessionError> {
        let Some(ref anchor) = self.anchor else {
            return Ok(true);
        };
        if !session.renders_scripts() {
            return Ok(has_match(&session.content().await?, anchor));
        }
        let timeout = self.timing.detail_timeout;
        let interval = self.timing.poll_interval;
        if wait_for_selector(session, anchor, timeout, interval).await? {
            return Ok(true);
        }
        debug!(
            "Detail anchor missing after {:?}; retrying in {:?}",
            timeout, self.timing.detail_retry_delay
        );
        tokio::time::sleep(self.timing.detail_retry_delay).await;
        wait_for_selector(session, anchor, timeout, interval).await
    }
}

#[async_trait]
impl TabTask for DetailEnricher<'_> {
    type Output = Result<FieldValues, SessionError>;

    async fn run(&self, session: &mut dyn BrowserSession) -> Self::Output {
        if !self.await_anchor(session).await? {
            warn!("Detail content did not render; keeping what is present");
        }
        let html = session.content().await?;
        let base = session
            .current_url()
            .await
            .ok()
            .and_then(|u| Url::parse(&u).ok());
        Ok(detail_fields(
            &html,
            &self.detail.fields,
            self.detail.links.as_ref(),
            base.as_ref(),
            self.missing,
        ))
    }
}
