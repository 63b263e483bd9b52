//! Scoped secondary tabs.

use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use tracing::{debug, warn};

use super::{panic_message, BrowserSession, SessionError};

/// Work performed inside an isolated tab.
#[async_trait]
pub trait TabTask: Sync {
    type Output: Send;

    async fn run(&self, session: &mut dyn BrowserSession) -> Self::Output;
}

/// Open `url` in a new tab, run `task` there, then close the tab and
/// reactivate the tab that was active before.
///
/// Teardown runs on every path, including a panicking task and a tab that
/// never opened. Teardown failures are logged and do not replace the task's
/// output. A panic inside the task surfaces as [`SessionError::TaskPanicked`].
pub async fn with_isolated_tab<T>(
    session: &mut dyn BrowserSession,
    url: &str,
    task: &T,
) -> Result<T::Output, SessionError>
where
    T: TabTask + ?Sized,
{
    let primary = session.active_tab();

    let tab = match session.open_tab(url).await {
        Ok(tab) => tab,
        Err(e) => {
            if session.active_tab() != primary {
                if let Err(restore) = session.switch_to(primary).await {
                    warn!("Failed to reactivate tab {}: {}", primary, restore);
                }
            }
            return Err(e);
        }
    };
    debug!("Opened tab {} for {}", tab, url);

    let output = AssertUnwindSafe(task.run(session)).catch_unwind().await;

    if let Err(e) = session.close_tab(tab).await {
        warn!("Failed to close tab {}: {}", tab, e);
    }
    if let Err(e) = session.switch_to(primary).await {
        warn!("Failed to reactivate tab {}: {}", primary, e);
    }
    output.map_err(|payload| {
        let message = panic_message(payload);
        warn!("Tab task for {} panicked: {}", url, message);
        SessionError::TaskPanicked(message)
    })
}
