//! Listing walker.
//!
//! Produces the pages of a site's exhibitor listing one at a time. Each call
//! to [`ListingWalker::next_page`] advances the live session by one page
//! (or, for infinite scroll, runs the whole scroll loop once) and returns
//! the items found there. Once it returns `None` the walk is over; a new
//! walk starts from page 1 with a new walker.

mod infinite_scroll;
mod next_button;
mod page_count;
mod query_param;

use scraper::{Html, Selector};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::config::Timing;
use crate::extract::{first_identity, listing_items, parse_selector, ExtractError, ItemResult};
use crate::session::{BrowserSession, SessionError};
use crate::sites::{Pagination, SiteDescriptor};
use crate::wait::{wait_for_selector, wait_until};

#[derive(Debug, Error)]
pub enum WalkError {
    #[error("Listing {url} did not load: {reason}")]
    ListingNotLoaded { url: String, reason: String },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Extract(#[from] ExtractError),
}

/// One page of listing items.
#[derive(Debug, Clone)]
pub struct ListingPage {
    /// 1-based page ordinal within this walk.
    pub number: u32,
    pub url: String,
    pub items: Vec<ItemResult>,
}

impl ListingPage {
    pub fn ok_count(&self) -> usize {
        self.items.iter().filter(|i| i.is_ok()).count()
    }
}

pub struct ListingWalker<'a> {
    site: &'a SiteDescriptor,
    timing: Timing,
    missing: &'a str,
    with_detail: bool,
    item: Selector,
    /// Number of the page the session is currently on (0 before loading).
    cursor: u32,
    /// Total pages, once known (page-count only).
    total: Option<u32>,
    emitted: u32,
    done: bool,
}

impl<'a> ListingWalker<'a> {
    pub fn new(
        site: &'a SiteDescriptor,
        timing: Timing,
        missing: &'a str,
        with_detail: bool,
    ) -> Result<Self, WalkError> {
        Ok(Self {
            site,
            timing,
            missing,
            with_detail,
            item: parse_selector(&site.item)?,
            cursor: 0,
            total: None,
            emitted: 0,
            done: false,
        })
    }

    /// Pages returned so far.
    pub fn pages_walked(&self) -> u32 {
        self.emitted
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Advance to and extract the next page. `Ok(None)` is the end of the
    /// listing; an error also ends the walk.
    pub async fn next_page(
        &mut self,
        session: &mut dyn BrowserSession,
    ) -> Result<Option<ListingPage>, WalkError> {
        if self.done {
            return Ok(None);
        }

        let site = self.site;
        let result = match &site.pagination {
            Pagination::NextButton { next } => next_button::advance(self, session, next).await,
            Pagination::InfiniteScroll {
                stability_threshold,
                max_items,
                max_scrolls,
                container,
            } => {
                infinite_scroll::advance(
                    self,
                    session,
                    *stability_threshold,
                    *max_items,
                    *max_scrolls,
                    container.as_deref(),
                )
                .await
            }
            Pagination::PageCount {
                indicator,
                total_pages,
                url_template,
                next,
            } => {
                page_count::advance(
                    self,
                    session,
                    indicator.as_deref(),
                    *total_pages,
                    url_template.as_deref(),
                    next.as_deref(),
                )
                .await
            }
            Pagination::QueryParam {
                url_template,
                start_page,
                max_pages,
                stop_on_empty,
            } => {
                query_param::advance(
                    self,
                    session,
                    url_template,
                    *start_page,
                    *max_pages,
                    *stop_on_empty,
                )
                .await
            }
        };

        match result {
            Ok(Some(page)) => {
                self.emitted += 1;
                debug!(
                    site = %site.id,
                    page = page.number,
                    items = page.items.len(),
                    "Listing page extracted"
                );
                Ok(Some(page))
            }
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }

    /// Navigate to the first listing page and wait for items to render.
    async fn load_first(
        &self,
        session: &mut dyn BrowserSession,
        url: &str,
    ) -> Result<(), WalkError> {
        session
            .navigate(url)
            .await
            .map_err(|e| WalkError::ListingNotLoaded {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        let found = wait_for_selector(
            session,
            &self.item,
            self.timing.load_timeout,
            self.timing.poll_interval,
        )
        .await?;
        if !found {
            return Err(WalkError::ListingNotLoaded {
                url: url.to_string(),
                reason: format!(
                    "no '{}' items within {:?}",
                    self.site.item, self.timing.load_timeout
                ),
            });
        }
        Ok(())
    }

    fn count(&self, html: &str) -> usize {
        Html::parse_document(html).select(&self.item).count()
    }

    /// Identity of the first item, used to detect that a page changed.
    fn identity(&self, html: &str) -> Result<Option<String>, WalkError> {
        let spec = self.site.listing_spec(None, self.missing, false);
        Ok(first_identity(html, &spec)?)
    }

    /// Wait until the first item's identity differs from `before`.
    async fn await_change(
        &self,
        session: &mut dyn BrowserSession,
        before: Option<&str>,
    ) -> Result<bool, WalkError> {
        let spec = self.site.listing_spec(None, self.missing, false);
        let changed = wait_until(
            session,
            self.timing.change_timeout,
            self.timing.poll_interval,
            |html| match first_identity(html, &spec) {
                Ok(Some(now)) => before != Some(now.as_str()),
                _ => false,
            },
        )
        .await?;
        Ok(changed)
    }

    /// Extract the current state of the active tab as page `number`.
    async fn snapshot(
        &self,
        session: &mut dyn BrowserSession,
        number: u32,
    ) -> Result<ListingPage, WalkError> {
        let html = session.content().await?;
        let url = session
            .current_url()
            .await
            .unwrap_or_else(|_| self.site.listing_url.clone());
        let base = Url::parse(&url)
            .or_else(|_| Url::parse(&self.site.listing_url))
            .ok();
        let spec = self.site.listing_spec(base.as_ref(), self.missing, self.with_detail);
        let items = listing_items(&html, &spec)?;
        Ok(ListingPage { number, url, items })
    }
}
