use tracing::{info, warn};

use super::{ListingPage, ListingWalker, WalkError};
use crate::extract::{control_state, ControlState};
use crate::session::BrowserSession;

pub(super) async fn advance(
    walker: &mut ListingWalker<'_>,
    session: &mut dyn BrowserSession,
    control: &str,
) -> Result<Option<ListingPage>, WalkError> {
    if walker.cursor == 0 {
        walker.load_first(session, &walker.site.listing_url).await?;
        walker.cursor = 1;
        return Ok(Some(walker.snapshot(session, 1).await?));
    }

    let html = session.content().await?;
    match control_state(&html, control)? {
        ControlState::Missing => {
            info!("No next control after page {}", walker.cursor);
            return Ok(None);
        }
        ControlState::Disabled => {
            info!("Next control disabled after page {}", walker.cursor);
            return Ok(None);
        }
        ControlState::Enabled => {}
    }

    let before = walker.identity(&html)?;
    if !session.click(control).await? {
        info!("Next control could not be activated after page {}", walker.cursor);
        return Ok(None);
    }
    if !walker.await_change(session, before.as_deref()).await? {
        warn!(
            "Listing did not change within {:?} after page {}; treating as end",
            walker.timing.change_timeout, walker.cursor
        );
        return Ok(None);
    }

    walker.cursor += 1;
    Ok(Some(walker.snapshot(session, walker.cursor).await?))
}
