mod common;

use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::{fast_settings, paged, site, Paging, ScriptedSession, LISTING_URL};
use expocrawl::enricher::DetailEnricher;
use expocrawl::session::{with_isolated_tab, BrowserSession, SessionError, TabTask};

fn value<'a>(values: &'a [(String, String)], column: &str) -> Option<&'a str> {
    values
        .iter()
        .find(|(c, _)| c == column)
        .map(|(_, v)| v.as_str())
}

async fn on_listing(session: &mut ScriptedSession) {
    session.navigate(LISTING_URL).await.unwrap();
    assert_eq!(session.active_tab(), 0);
}

#[tokio::test]
async fn test_enrich_returns_to_listing_tab() {
    let pages = paged(&[3]);
    let url = ScriptedSession::detail_url(&pages[0][0]);
    let mut session = ScriptedSession::new(pages, Paging::NextButton);
    on_listing(&mut session).await;

    let dir = tempfile::tempdir().unwrap();
    let settings = fast_settings(dir.path());
    let site = site("strategy = \"next-button\"\nnext = \"button.next\"", true);
    let enricher = DetailEnricher::new(site.detail.as_ref().unwrap(), &settings.timing, "");

    let values = enricher.enrich(&mut session, &url).await.unwrap();
    assert_eq!(value(&values, "Description"), Some("About Exhibitor 01"));
    assert_eq!(value(&values, "Website"), Some("https://exhibitor1.example/"));
    assert_eq!(
        value(&values, "LinkedIn"),
        Some("https://www.linkedin.com/company/exhibitor-01")
    );

    assert_eq!(session.active_tab(), 0);
    assert_eq!(session.tab_count(), 1);
    assert_eq!(session.current_url().await.unwrap(), LISTING_URL);
}

#[tokio::test]
async fn test_failed_detail_load_leaves_listing_active() {
    let pages = paged(&[3]);
    let failing = ScriptedSession::detail_url(&pages[0][1]);
    let mut session = ScriptedSession::new(pages, Paging::NextButton).fail_url(&failing);
    on_listing(&mut session).await;

    let dir = tempfile::tempdir().unwrap();
    let settings = fast_settings(dir.path());
    let site = site("strategy = \"next-button\"\nnext = \"button.next\"", true);
    let enricher = DetailEnricher::new(site.detail.as_ref().unwrap(), &settings.timing, "");

    let err = enricher.enrich(&mut session, &failing).await.unwrap_err();
    assert!(matches!(err, SessionError::Navigation { .. }));
    assert_eq!(session.active_tab(), 0);
    assert_eq!(session.tab_count(), 1);
    assert_eq!(session.current_url().await.unwrap(), LISTING_URL);
}

#[tokio::test]
async fn test_missing_anchor_still_extracts() {
    let pages = paged(&[1]);
    let url = ScriptedSession::detail_url(&pages[0][0]);
    let mut session = ScriptedSession::new(pages, Paging::NextButton);
    on_listing(&mut session).await;

    let dir = tempfile::tempdir().unwrap();
    let settings = fast_settings(dir.path());
    let site = site("strategy = \"next-button\"\nnext = \"button.next\"", true);
    let mut detail = site.detail.clone().unwrap();
    detail.anchor = Some("section.never-rendered".to_string());
    let enricher = DetailEnricher::new(&detail, &settings.timing, "");

    let started = Instant::now();
    let values = enricher.enrich(&mut session, &url).await.unwrap();
    // Waited out the anchor twice with a retry delay between.
    assert!(started.elapsed() >= Duration::from_millis(60));
    assert_eq!(value(&values, "Description"), Some("About Exhibitor 01"));
    assert_eq!(session.tab_count(), 1);
}

#[tokio::test]
async fn test_static_session_checks_anchor_once() {
    let pages = paged(&[1]);
    let url = ScriptedSession::detail_url(&pages[0][0]);
    let mut session = ScriptedSession::new(pages, Paging::NextButton);
    session.static_content = true;
    on_listing(&mut session).await;

    let dir = tempfile::tempdir().unwrap();
    let settings = fast_settings(dir.path());
    let site = site("strategy = \"next-button\"\nnext = \"button.next\"", true);
    let mut detail = site.detail.clone().unwrap();
    detail.anchor = Some("section.never-rendered".to_string());
    let enricher = DetailEnricher::new(&detail, &settings.timing, "");

    let started = Instant::now();
    let values = enricher.enrich(&mut session, &url).await.unwrap();
    assert!(started.elapsed() < Duration::from_millis(30));
    assert_eq!(value(&values, "Description"), Some("About Exhibitor 01"));
    // One anchor check and one extraction read.
    assert_eq!(session.content_reads, 2);
    assert_eq!(session.tab_count(), 1);
}

/// Navigates the isolated tab somewhere that fails.
struct Wander;

#[async_trait]
impl TabTask for Wander {
    type Output = Result<(), SessionError>;

    async fn run(&self, session: &mut dyn BrowserSession) -> Self::Output {
        session.navigate("https://expo.test/nowhere").await
    }
}

/// Reports how many tabs are open while it runs.
struct Count;

#[async_trait]
impl TabTask for Count {
    type Output = usize;

    async fn run(&self, session: &mut dyn BrowserSession) -> Self::Output {
        session.tab_count()
    }
}

/// Panics partway through its work.
struct Crash;

#[async_trait]
impl TabTask for Crash {
    type Output = ();

    async fn run(&self, session: &mut dyn BrowserSession) -> Self::Output {
        let _ = session.content().await;
        panic!("tab renderer crashed");
    }
}

#[tokio::test]
async fn test_panicking_task_still_closes_tab() {
    let pages = paged(&[2]);
    let url = ScriptedSession::detail_url(&pages[0][0]);
    let mut session = ScriptedSession::new(pages, Paging::NextButton);
    on_listing(&mut session).await;

    let err = with_isolated_tab(&mut session, &url, &Crash).await.unwrap_err();
    match err {
        SessionError::TaskPanicked(ref message) => assert!(message.contains("tab renderer crashed")),
        other => panic!("expected a panicked task, got {:?}", other),
    }
    assert_eq!(session.active_tab(), 0);
    assert_eq!(session.tab_count(), 1);
    assert_eq!(session.max_open_tabs, 2);
    assert_eq!(session.current_url().await.unwrap(), LISTING_URL);
}

#[tokio::test]
async fn test_task_error_still_closes_tab() {
    let pages = paged(&[2]);
    let url = ScriptedSession::detail_url(&pages[0][1]);
    let mut session = ScriptedSession::new(pages, Paging::NextButton);
    on_listing(&mut session).await;

    let output = with_isolated_tab(&mut session, &url, &Wander).await.unwrap();
    assert!(output.is_err());
    assert_eq!(session.active_tab(), 0);
    assert_eq!(session.tab_count(), 1);

    let inside = with_isolated_tab(&mut session, &url, &Count).await.unwrap();
    assert_eq!(inside, 2);
    assert_eq!(session.tab_count(), 1);
    assert_eq!(session.max_open_tabs, 2);
}
