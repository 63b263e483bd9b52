use tracing::{debug, info};

use super::{ListingPage, ListingWalker, WalkError};
use crate::session::BrowserSession;
use crate::wait::wait_until;

/// Scroll until `threshold` consecutive attempts add no items, then emit
/// everything as a single page.
pub(super) async fn advance(
    walker: &mut ListingWalker<'_>,
    session: &mut dyn BrowserSession,
    threshold: u32,
    max_items: Option<usize>,
    max_scrolls: Option<u32>,
    container: Option<&str>,
) -> Result<Option<ListingPage>, WalkError> {
    if walker.cursor > 0 {
        return Ok(None);
    }
    walker.load_first(session, &walker.site.listing_url).await?;
    walker.cursor = 1;

    let mut count = walker.count(&session.content().await?);
    let mut stable = 0u32;
    let mut scrolls = 0u32;

    loop {
        if max_items.is_some_and(|max| count >= max) {
            info!("Reached item limit ({} items)", count);
            break;
        }
        if stable >= threshold {
            break;
        }
        if max_scrolls.is_some_and(|max| scrolls >= max) {
            info!("Reached scroll limit after {} scrolls", scrolls);
            break;
        }

        session.scroll_to_bottom(container).await?;
        scrolls += 1;

        let before = count;
        wait_until(
            session,
            walker.timing.scroll_delay,
            walker.timing.poll_interval,
            |html| walker.count(html) > before,
        )
        .await?;
        let now = walker.count(&session.content().await?);

        if now > count {
            debug!("Scroll {}: {} -> {} items", scrolls, count, now);
            count = now;
            stable = 0;
        } else {
            stable += 1;
            debug!("Scroll {}: no growth ({}/{})", scrolls, stable, threshold);
        }
    }

    info!("Listing settled at {} items after {} scrolls", count, scrolls);
    let mut page = walker.snapshot(session, 1).await?;
    if let Some(max) = max_items {
        page.items.truncate(max);
    }
    Ok(Some(page))
}
