use tracing::{info, warn};

use super::{ListingPage, ListingWalker, WalkError};
use crate::session::BrowserSession;
use crate::sites::page_url;
use crate::wait::wait_for_selector;

/// Fetch page `start_page + n - 1` for the n-th call.
///
/// The first page must load. Later navigation failures skip the page when
/// the walk is bounded by `max_pages` and end it otherwise.
pub(super) async fn advance(
    walker: &mut ListingWalker<'_>,
    session: &mut dyn BrowserSession,
    template: &str,
    start_page: u32,
    max_pages: Option<u32>,
    stop_on_empty: bool,
) -> Result<Option<ListingPage>, WalkError> {
    loop {
        let number = walker.cursor + 1;
        if max_pages.is_some_and(|max| number > max) {
            info!("Reached page limit ({} pages)", number - 1);
            return Ok(None);
        }
        walker.cursor = number;
        let url = page_url(template, start_page + number - 1);

        if let Err(e) = session.navigate(&url).await {
            if number == 1 {
                return Err(WalkError::ListingNotLoaded {
                    url,
                    reason: e.to_string(),
                });
            }
            if max_pages.is_some() {
                warn!("Skipping page {}: {}", number, e);
                continue;
            }
            warn!("Stopping at page {}: {}", number, e);
            return Ok(None);
        }

        let timeout = if number == 1 {
            walker.timing.load_timeout
        } else {
            walker.timing.change_timeout
        };
        wait_for_selector(session, &walker.item, timeout, walker.timing.poll_interval).await?;

        let page = walker.snapshot(session, number).await?;
        if page.items.is_empty() && stop_on_empty {
            info!("Page {} has no items; end of listing", number);
            return Ok(None);
        }
        return Ok(Some(page));
    }
}
