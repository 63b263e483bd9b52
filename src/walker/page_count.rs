use tracing::{debug, info, warn};

use super::{ListingPage, ListingWalker, WalkError};
use crate::extract::{control_state, first_text, parse_page_total, ControlState};
use crate::session::BrowserSession;
use crate::sites::page_url;
use crate::wait::wait_for_selector;

/// Total page count: a parsed indicator wins over the fixed bound, and with
/// neither the walk stops after the first page.
fn resolve_total(parsed: Option<u32>, bound: Option<u32>) -> u32 {
    match (parsed, bound) {
        (Some(n), _) => n.max(1),
        (None, Some(n)) => n.max(1),
        (None, None) => {
            warn!("Page count unknown; stopping after the first page");
            1
        }
    }
}

pub(super) async fn advance(
    walker: &mut ListingWalker<'_>,
    session: &mut dyn BrowserSession,
    indicator: Option<&str>,
    total_pages: Option<u32>,
    url_template: Option<&str>,
    next: Option<&str>,
) -> Result<Option<ListingPage>, WalkError> {
    if walker.cursor == 0 {
        walker.load_first(session, &walker.site.listing_url).await?;
        let html = session.content().await?;
        let parsed = match indicator {
            Some(sel) => {
                let text = first_text(&html, sel)?;
                let parsed = text.as_deref().and_then(parse_page_total);
                if parsed.is_none() {
                    debug!("Page indicator unreadable: {:?}", text);
                }
                parsed
            }
            None => None,
        };
        let total = resolve_total(parsed, total_pages);
        info!("Listing has {} pages", total);
        walker.total = Some(total);
        walker.cursor = 1;
        return Ok(Some(walker.snapshot(session, 1).await?));
    }

    let total = walker.total.unwrap_or(1);
    loop {
        if walker.cursor >= total {
            return Ok(None);
        }
        let number = walker.cursor + 1;

        match (url_template, next) {
            (Some(template), _) => {
                walker.cursor = number;
                let url = page_url(template, number);
                if let Err(e) = session.navigate(&url).await {
                    warn!("Skipping page {} of {}: {}", number, total, e);
                    continue;
                }
                let found = wait_for_selector(
                    session,
                    &walker.item,
                    walker.timing.change_timeout,
                    walker.timing.poll_interval,
                )
                .await?;
                if !found {
                    warn!("No items on page {} of {}", number, total);
                }
            }
            (None, Some(control)) => {
                let html = session.content().await?;
                if control_state(&html, control)? != ControlState::Enabled {
                    warn!(
                        "Next control unavailable on page {} of {}; stopping",
                        walker.cursor, total
                    );
                    return Ok(None);
                }
                let before = walker.identity(&html)?;
                if !session.click(control).await?
                    || !walker.await_change(session, before.as_deref()).await?
                {
                    warn!(
                        "Could not advance past page {} of {}; stopping",
                        walker.cursor, total
                    );
                    return Ok(None);
                }
                walker.cursor = number;
            }
            (None, None) => return Ok(None),
        }

        return Ok(Some(walker.snapshot(session, number).await?));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indicator_wins_over_bound() {
        assert_eq!(resolve_total(Some(4), Some(7)), 4);
        assert_eq!(resolve_total(None, Some(7)), 7);
    }

    #[test]
    fn test_unknown_total_fails_closed() {
        assert_eq!(resolve_total(None, None), 1);
        assert_eq!(resolve_total(Some(0), None), 1);
    }
}
