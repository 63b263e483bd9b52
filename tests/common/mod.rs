//! Scripted in-memory session used by the integration tests.
//!
//! Renders a synthetic exhibitor directory as HTML. The listing pages by
//! next button, by `?page=N` URLs, or by revealing more items on scroll,
//! and every exhibitor has a detail page under `/exhibitors/<slug>`.

#![allow(dead_code)]

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use expocrawl::config::{Settings, Timing};
use expocrawl::runner::Interrupt;
use expocrawl::session::{BrowserSession, SessionError, TabId};
use expocrawl::sites::SiteDescriptor;

pub const LISTING_URL: &str = "https://expo.test/exhibitors";

#[derive(Debug, Clone)]
pub struct Exhibitor {
    pub name: String,
    pub booth: String,
    pub website: Option<String>,
}

impl Exhibitor {
    pub fn numbered(n: usize) -> Self {
        Self {
            name: format!("Exhibitor {:02}", n),
            booth: format!("B{}", n),
            website: Some(format!("https://exhibitor{}.example/", n)),
        }
    }

    pub fn slug(&self) -> String {
        self.name.to_lowercase().replace(' ', "-")
    }
}

/// `n` exhibitors split into pages of the given sizes.
pub fn paged(sizes: &[usize]) -> Vec<Vec<Exhibitor>> {
    let mut n = 0;
    sizes
        .iter()
        .map(|&size| {
            (0..size)
                .map(|_| {
                    n += 1;
                    Exhibitor::numbered(n)
                })
                .collect()
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Paging {
    /// `button.next`, disabled on the last page.
    NextButton,
    /// `button.next` removed on the last page.
    NextButtonRemoved,
    /// `button.next` is enabled but clicking it changes nothing.
    StuckNextButton,
    /// All pages flattened; scrolling reveals `batch` more items.
    Scroll { initial: usize, batch: usize },
    /// `?page=N`, no controls.
    Query,
}

#[derive(Debug, Clone)]
enum View {
    Blank,
    Listing { page: usize, revealed: usize },
    Detail { slug: String },
}

#[derive(Debug, Clone)]
struct Tab {
    url: String,
    view: View,
}

pub struct ScriptedSession {
    pages: Vec<Vec<Exhibitor>>,
    paging: Paging,
    /// URLs that fail to load.
    pub failing_urls: HashSet<String>,
    /// Panic when serving content of this listing page (0-based).
    pub panic_on_page: Option<usize>,
    /// Trigger this interrupt when the n-th detail tab opens.
    pub interrupt_on_detail: Option<(usize, Interrupt)>,
    /// Panic when serving content of this detail slug.
    pub panic_on_detail: Option<String>,
    /// Content reads that fail right after each successful click.
    pub failing_reads_after_click: usize,
    /// Serve pages like a plain HTTP fetch, which never re-render.
    pub static_content: bool,
    pending_read_failures: usize,
    tabs: Vec<Option<Tab>>,
    active: TabId,
    pub clicks: usize,
    pub scrolls: usize,
    /// Container passed to each scroll.
    pub scroll_containers: Vec<Option<String>>,
    pub content_reads: usize,
    pub details_opened: usize,
    pub max_open_tabs: usize,
    pub shutdowns: usize,
}

impl ScriptedSession {
    pub fn new(pages: Vec<Vec<Exhibitor>>, paging: Paging) -> Self {
        Self {
            pages,
            paging,
            failing_urls: HashSet::new(),
            panic_on_page: None,
            interrupt_on_detail: None,
            panic_on_detail: None,
            failing_reads_after_click: 0,
            static_content: false,
            pending_read_failures: 0,
            tabs: vec![Some(Tab {
                url: "about:blank".to_string(),
                view: View::Blank,
            })],
            active: 0,
            clicks: 0,
            scrolls: 0,
            scroll_containers: Vec::new(),
            content_reads: 0,
            details_opened: 0,
            max_open_tabs: 1,
            shutdowns: 0,
        }
    }

    pub fn fail_url(mut self, url: &str) -> Self {
        self.failing_urls.insert(url.to_string());
        self
    }

    pub fn detail_url(exhibitor: &Exhibitor) -> String {
        format!("{}/{}", LISTING_URL, exhibitor.slug())
    }

    fn all(&self) -> Vec<&Exhibitor> {
        self.pages.iter().flatten().collect()
    }

    fn resolve(&self, url: &str) -> Result<View, SessionError> {
        if self.failing_urls.contains(url) {
            return Err(SessionError::Navigation {
                url: url.to_string(),
                message: "connection reset".to_string(),
            });
        }
        if url == LISTING_URL {
            let revealed = match self.paging {
                Paging::Scroll { initial, .. } => initial,
                _ => usize::MAX,
            };
            return Ok(View::Listing { page: 0, revealed });
        }
        if let Some(n) = url
            .strip_prefix(LISTING_URL)
            .and_then(|rest| rest.strip_prefix("?page="))
        {
            let n: usize = n.parse().map_err(|_| SessionError::Navigation {
                url: url.to_string(),
                message: "bad page".to_string(),
            })?;
            return Ok(View::Listing {
                page: n.saturating_sub(1),
                revealed: usize::MAX,
            });
        }
        if let Some(slug) = url
            .strip_prefix(LISTING_URL)
            .and_then(|rest| rest.strip_prefix('/'))
        {
            if self.all().iter().any(|e| e.slug() == slug) {
                return Ok(View::Detail {
                    slug: slug.to_string(),
                });
            }
        }
        Err(SessionError::Navigation {
            url: url.to_string(),
            message: "404".to_string(),
        })
    }

    fn active(&self) -> Result<&Tab, SessionError> {
        self.tabs
            .get(self.active)
            .and_then(Option::as_ref)
            .ok_or(SessionError::UnknownTab(self.active))
    }

    fn active_mut(&mut self) -> Result<&mut Tab, SessionError> {
        let id = self.active;
        self.tabs
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or(SessionError::UnknownTab(id))
    }

    fn item_html(e: &Exhibitor) -> String {
        format!(
            r#"<div class="item"><h4 class="name">{}</h4><span class="booth">{}</span><a class="more" href="/exhibitors/{}">More</a></div>"#,
            e.name,
            e.booth,
            e.slug()
        )
    }

    fn render_listing(&self, page: usize, revealed: usize) -> String {
        let (items, last): (Vec<&Exhibitor>, bool) = match self.paging {
            Paging::Scroll { .. } => (self.all().into_iter().take(revealed).collect(), true),
            _ => match self.pages.get(page) {
                Some(p) => (p.iter().collect(), page + 1 >= self.pages.len()),
                None => (Vec::new(), true),
            },
        };
        let body: String = items.iter().map(|e| Self::item_html(e)).collect();
        let control = match self.paging {
            Paging::NextButton if last => r#"<button class="next" disabled>Next</button>"#,
            Paging::NextButtonRemoved if last => "",
            Paging::NextButton | Paging::NextButtonRemoved | Paging::StuckNextButton => {
                r#"<button class="next">Next</button>"#
            }
            _ => "",
        };
        format!(
            r#"<html><body><div class="list">{}</div><div class="pager"><div class="pager-text">Page {} of {}</div>{}</div></body></html>"#,
            body,
            page + 1,
            self.pages.len(),
            control
        )
    }

    fn render_detail(&self, slug: &str) -> String {
        let all = self.all();
        let Some(e) = all.iter().find(|e| e.slug() == slug) else {
            return "<html><body>gone</body></html>".to_string();
        };
        let website = e
            .website
            .as_ref()
            .map(|w| format!(r#"<a href="{}">Website</a>"#, w))
            .unwrap_or_default();
        format!(
            r#"<html><body><h1 class="title">{}</h1><p class="about">About {}</p><div class="contacts">{}<a href="https://www.linkedin.com/company/{}">LinkedIn</a><a href="/exhibitors">Back</a></div></body></html>"#,
            e.name, e.name, website, slug
        )
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        let view = self.resolve(url)?;
        let tab = self.active_mut()?;
        tab.url = url.to_string();
        tab.view = view;
        Ok(())
    }

    async fn content(&mut self) -> Result<String, SessionError> {
        self.content_reads += 1;
        if self.pending_read_failures > 0 {
            self.pending_read_failures -= 1;
            return Err(SessionError::Browser(
                "Execution context was destroyed".to_string(),
            ));
        }
        let view = self.active()?.view.clone();
        Ok(match view {
            View::Blank => "<html><body></body></html>".to_string(),
            View::Listing { page, revealed } => {
                if self.panic_on_page == Some(page) {
                    panic!("renderer crashed on page {}", page + 1);
                }
                self.render_listing(page, revealed)
            }
            View::Detail { slug } => {
                if self.panic_on_detail.as_deref() == Some(slug.as_str()) {
                    panic!("detail renderer crashed on {}", slug);
                }
                self.render_detail(&slug)
            }
        })
    }

    async fn current_url(&mut self) -> Result<String, SessionError> {
        Ok(self.active()?.url.clone())
    }

    async fn click(&mut self, selector: &str) -> Result<bool, SessionError> {
        if selector != "button.next" {
            return Ok(false);
        }
        let paging = self.paging;
        let pages = self.pages.len();
        let tab = self.active_mut()?;
        let View::Listing { ref mut page, .. } = tab.view else {
            return Ok(false);
        };
        match paging {
            Paging::NextButton | Paging::NextButtonRemoved if *page + 1 < pages => {
                *page += 1;
            }
            Paging::NextButton | Paging::StuckNextButton => {}
            _ => return Ok(false),
        }
        self.clicks += 1;
        self.pending_read_failures = self.failing_reads_after_click;
        Ok(true)
    }

    async fn scroll_to_bottom(&mut self, container: Option<&str>) -> Result<(), SessionError> {
        self.scrolls += 1;
        self.scroll_containers.push(container.map(str::to_string));
        let total = self.all().len();
        if let Paging::Scroll { batch, .. } = self.paging {
            let tab = self.active_mut()?;
            if let View::Listing {
                ref mut revealed, ..
            } = tab.view
            {
                *revealed = (*revealed + batch).min(total);
            }
        }
        Ok(())
    }

    async fn open_tab(&mut self, url: &str) -> Result<TabId, SessionError> {
        self.details_opened += 1;
        if let Some((n, ref interrupt)) = self.interrupt_on_detail {
            if self.details_opened == n {
                interrupt.trigger();
            }
        }
        let view = self.resolve(url)?;
        self.tabs.push(Some(Tab {
            url: url.to_string(),
            view,
        }));
        self.active = self.tabs.len() - 1;
        self.max_open_tabs = self.max_open_tabs.max(self.tab_count());
        Ok(self.active)
    }

    async fn close_tab(&mut self, tab: TabId) -> Result<(), SessionError> {
        match self.tabs.get_mut(tab) {
            Some(slot @ Some(_)) if tab != 0 => *slot = None,
            _ => return Err(SessionError::UnknownTab(tab)),
        }
        if self.active == tab {
            self.active = 0;
        }
        Ok(())
    }

    async fn switch_to(&mut self, tab: TabId) -> Result<(), SessionError> {
        if self.tabs.get(tab).and_then(Option::as_ref).is_none() {
            return Err(SessionError::UnknownTab(tab));
        }
        self.active = tab;
        Ok(())
    }

    fn active_tab(&self) -> TabId {
        self.active
    }

    fn tab_count(&self) -> usize {
        self.tabs.iter().filter(|t| t.is_some()).count()
    }

    fn renders_scripts(&self) -> bool {
        !self.static_content
    }

    async fn shutdown(&mut self) -> Result<(), SessionError> {
        self.shutdowns += 1;
        Ok(())
    }
}

/// Settings with millisecond-scale waits and output under `dir`.
pub fn fast_settings(dir: &std::path::Path) -> Settings {
    Settings {
        output_dir: dir.to_path_buf(),
        timing: Timing {
            load_timeout: Duration::from_millis(200),
            change_timeout: Duration::from_millis(60),
            detail_timeout: Duration::from_millis(30),
            detail_retry_delay: Duration::from_millis(5),
            poll_interval: Duration::from_millis(5),
            scroll_delay: Duration::from_millis(15),
        },
        ..Settings::default()
    }
}

/// Descriptor for the scripted directory with the given pagination table.
pub fn site(pagination: &str, with_detail: bool) -> SiteDescriptor {
    let detail = if with_detail {
        r#"
[detail]
anchor = "h1.title"

[detail.link]
column = "URL"
selector = "a.more"
attr = "href"

[[detail.fields]]
column = "Description"
selector = "p.about"

[detail.links]
selector = "div.contacts"
kinds = ["website", "linkedin"]
"#
    } else {
        ""
    };
    let src = format!(
        r#"
name = "Scripted Expo"
listing_url = "{LISTING_URL}"
item = "div.item"

[[fields]]
column = "Company Name"
selector = "h4.name"
required = true

[[fields]]
column = "Booth Number"
selector = "span.booth"

[pagination]
{pagination}
{detail}
[output]
file = "scripted.csv"
"#
    );
    let mut site: SiteDescriptor = toml::from_str(&src).expect("scripted descriptor parses");
    site.id = "scripted".to_string();
    site.validate().expect("scripted descriptor is valid");
    site
}

/// Read a delimited output file into header + rows.
pub fn read_rows(path: &std::path::Path) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .expect("output exists");
    let header = reader
        .headers()
        .expect("header row")
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|r| r.expect("row").iter().map(str::to_string).collect())
        .collect();
    (header, rows)
}

pub fn col(header: &[String], name: &str) -> usize {
    header
        .iter()
        .position(|h| h == name)
        .unwrap_or_else(|| panic!("no column {}", name))
}
