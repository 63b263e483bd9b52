//! Bounded polling against the live page.

use std::time::Duration;

use scraper::{Html, Selector};
use tokio::time::Instant;
use tracing::debug;

use crate::session::{BrowserSession, SessionError};

/// Yields until a deadline, sleeping `interval` between checks.
///
/// The first tick returns immediately and the last one lands on the
/// deadline, so a condition is always checked at least once and once more
/// at timeout.
#[derive(Debug)]
pub struct Poller {
    deadline: Instant,
    interval: Duration,
    first: bool,
}

impl Poller {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            interval: interval.max(Duration::from_millis(1)),
            first: true,
        }
    }

    /// Wait for the next check. Returns false once the deadline has passed.
    pub async fn tick(&mut self) -> bool {
        if self.first {
            self.first = false;
            return true;
        }
        let now = Instant::now();
        if now >= self.deadline {
            return false;
        }
        tokio::time::sleep(self.interval.min(self.deadline - now)).await;
        true
    }
}

/// Poll the active tab's content until `ready` holds or `timeout` elapses.
///
/// A failed read counts as not ready, since the page may be mid-navigation.
/// The last read error is returned only when no read succeeded.
pub async fn wait_until<F>(
    session: &mut dyn BrowserSession,
    timeout: Duration,
    interval: Duration,
    mut ready: F,
) -> Result<bool, SessionError>
where
    F: FnMut(&str) -> bool + Send,
{
    let mut poller = Poller::new(timeout, interval);
    let mut read_once = false;
    let mut last_error = None;
    while poller.tick().await {
        match session.content().await {
            Ok(html) => {
                read_once = true;
                if ready(&html) {
                    return Ok(true);
                }
            }
            Err(e) => {
                debug!("Content read failed while waiting: {}", e);
                last_error = Some(e);
            }
        }
    }
    match last_error {
        Some(e) if !read_once => Err(e),
        _ => Ok(false),
    }
}

/// Whether `selector` matches anything in an HTML snapshot.
pub fn has_match(html: &str, selector: &Selector) -> bool {
    Html::parse_document(html).select(selector).next().is_some()
}

/// Wait until `selector` matches at least one element.
pub async fn wait_for_selector(
    session: &mut dyn BrowserSession,
    selector: &Selector,
    timeout: Duration,
    interval: Duration,
) -> Result<bool, SessionError> {
    wait_until(session, timeout, interval, |html| has_match(html, selector)).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_poller_checks_at_least_twice() {
        let mut poller = Poller::new(Duration::from_millis(20), Duration::from_millis(5));
        let start = Instant::now();
        let mut ticks = 0;
        while poller.tick().await {
            ticks += 1;
        }
        assert!(ticks >= 2);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_zero_timeout_checks_once() {
        let mut poller = Poller::new(Duration::ZERO, Duration::from_millis(5));
        assert!(poller.tick().await);
        assert!(!poller.tick().await);
    }

    #[test]
    fn test_has_match() {
        let sel = Selector::parse("div.item").unwrap();
        assert!(has_match("<div class='item'>x</div>", &sel));
        assert!(!has_match("<div class='other'>x</div>", &sel));
    }
}
