//! Declarative site descriptors.
//!
//! A descriptor names a listing URL, the item selector, field rules, an
//! optional detail-page section, and a pagination strategy. One generic
//! walker and enricher consume every descriptor.

mod registry;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::config::TimingOverrides;
use crate::extract::{parse_selector, FieldRule, LinkRule, ListingSpec};
use crate::models::columns;
use crate::sink::OutputFormat;

pub use registry::SiteRegistry;

/// Placeholder replaced by the page number in URL templates.
pub const PAGE_PLACEHOLDER: &str = "{page}";

/// Errors from descriptor lookup and validation.
#[derive(Debug, Error)]
pub enum SiteError {
    #[error("Unknown site '{id}'. Available: {available}")]
    Unknown { id: String, available: String },

    #[error("Site '{site}' is invalid: {}", .problems.join("; "))]
    Invalid { site: String, problems: Vec<String> },

    #[error("Failed to parse built-in site table: {0}")]
    Builtin(String),
}

/// How a site's pages are fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// Chromium via the DevTools protocol.
    #[default]
    Browser,
    /// Plain HTTP requests, static HTML only.
    Http,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Browser => "browser",
            Engine::Http => "http",
        }
    }
}

fn default_stability_threshold() -> u32 {
    3
}

fn default_start_page() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// Pagination strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "kebab-case")]
pub enum Pagination {
    /// Click a "next" control until it is missing, disabled, or stops
    /// changing the page.
    NextButton {
        /// Selector of the next control; the last match is used.
        next: String,
    },

    /// Scroll to the bottom until the item count stops growing.
    InfiniteScroll {
        /// Consecutive scrolls without growth that end the listing.
        #[serde(default = "default_stability_threshold")]
        stability_threshold: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_items: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_scrolls: Option<u32>,
        /// Scrollable element holding the results; the window when omitted.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        container: Option<String>,
    },

    /// A known number of pages, from an indicator ("Page 1 of 4") or a
    /// fixed bound.
    PageCount {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        indicator: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_pages: Option<u32>,
        /// Page URL template containing `{page}`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url_template: Option<String>,
        /// Next control, used when no URL template is given.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next: Option<String>,
    },

    /// Page N fetched from a URL template.
    QueryParam {
        url_template: String,
        #[serde(default = "default_start_page")]
        start_page: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_pages: Option<u32>,
        #[serde(default = "default_true")]
        stop_on_empty: bool,
    },
}

impl Pagination {
    pub fn strategy(&self) -> &'static str {
        match self {
            Pagination::NextButton { .. } => "next-button",
            Pagination::InfiniteScroll { .. } => "infinite-scroll",
            Pagination::PageCount { .. } => "page-count",
            Pagination::QueryParam { .. } => "query-param",
        }
    }

    fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let selector_problem =
            |sel: &str| parse_selector(sel).err().map(|e| format!("pagination: {}", e));
        match self {
            Pagination::NextButton { next } => problems.extend(selector_problem(next.as_str())),
            Pagination::InfiniteScroll {
                stability_threshold,
                container,
                ..
            } => {
                if *stability_threshold == 0 {
                    problems.push("pagination: stability_threshold must be at least 1".into());
                }
                if let Some(sel) = container {
                    problems.extend(selector_problem(sel.as_str()));
                }
            }
            Pagination::PageCount {
                indicator,
                total_pages,
                url_template,
                next,
            } => {
                for sel in [indicator, next].into_iter().flatten() {
                    problems.extend(selector_problem(sel.as_str()));
                }
                if indicator.is_none() && total_pages.is_none() {
                    problems.push("pagination: page-count needs an indicator or total_pages".into());
                }
                match url_template {
                    Some(t) if !t.contains(PAGE_PLACEHOLDER) => problems.push(format!(
                        "pagination: url_template '{}' has no {} placeholder",
                        t, PAGE_PLACEHOLDER
                    )),
                    None if next.is_none() => problems
                        .push("pagination: page-count needs a url_template or a next control".into()),
                    _ => {}
                }
            }
            Pagination::QueryParam {
                url_template,
                max_pages,
                stop_on_empty,
                ..
            } => {
                if !url_template.contains(PAGE_PLACEHOLDER) {
                    problems.push(format!(
                        "pagination: url_template '{}' has no {} placeholder",
                        url_template, PAGE_PLACEHOLDER
                    ));
                }
                if max_pages.is_none() && !stop_on_empty {
                    problems.push(
                        "pagination: query-param needs max_pages or stop_on_empty".into(),
                    );
                }
            }
        }
        problems
    }
}

/// Fill `{page}` in a URL template.
pub fn page_url(template: &str, page: u32) -> String {
    template.replace(PAGE_PLACEHOLDER, &page.to_string())
}

/// Detail-page section of a descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailConfig {
    /// Rule producing the detail link from a listing item.
    pub link: FieldRule,

    /// Content anchor awaited before extraction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldRule>,

    /// Link classification over a contacts or social block.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<LinkRule>,
}

/// Output settings of a descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Primary file name; `{id}` is replaced by the site id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Additional csv/tsv/json files rewritten alongside the primary one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary: Vec<String>,

    /// Key columns for order-preserving deduplication at save time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dedup_by: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_interval: Option<usize>,
}

impl OutputConfig {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// A declarative description of one exhibitor directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteDescriptor {
    /// Registry key, filled in on registration.
    #[serde(skip)]
    pub id: String,

    pub name: String,

    pub listing_url: String,

    #[serde(default)]
    pub engine: Engine,

    /// Selector matching one result element per exhibitor.
    pub item: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldRule>,

    /// Column used to detect that a page changed; the first field when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,

    /// User agent override (None, "impersonate", or a custom string).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    #[serde(default, skip_serializing_if = "TimingOverrides::is_default")]
    pub timing: TimingOverrides,

    pub pagination: Pagination,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<DetailConfig>,

    #[serde(default, skip_serializing_if = "OutputConfig::is_default")]
    pub output: OutputConfig,
}

impl SiteDescriptor {
    /// Output columns in record order: ordinals, listing fields, then
    /// detail URL, detail fields, and classified links.
    pub fn columns(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut push = |name: &str| {
            if !out.iter().any(|c| c == name) {
                out.push(name.to_string());
            }
        };

        for name in columns::ORDINALS {
            push(name);
        }
        for rule in &self.fields {
            push(&rule.column);
        }
        if let Some(ref detail) = self.detail {
            push(&detail.link.column);
            for rule in &detail.fields {
                push(&rule.column);
            }
            if let Some(ref links) = detail.links {
                for column in links.columns() {
                    push(column);
                }
            }
        }
        out
    }

    /// Column used for change detection.
    pub fn identity_column(&self) -> Option<&str> {
        self.identity
            .as_deref()
            .or_else(|| self.fields.first().map(|f| f.column.as_str()))
    }

    /// Listing extraction settings for this site.
    pub fn listing_spec<'a>(
        &'a self,
        base: Option<&'a Url>,
        missing: &'a str,
        with_detail: bool,
    ) -> ListingSpec<'a> {
        ListingSpec {
            item: &self.item,
            fields: &self.fields,
            identity: self.identity_column(),
            detail_link: self
                .detail
                .as_ref()
                .filter(|_| with_detail)
                .map(|d| &d.link),
            base,
            missing,
        }
    }

    /// Primary output file name.
    pub fn output_file(&self) -> String {
        self.output
            .file
            .clone()
            .unwrap_or_else(|| "{id}.xlsx".to_string())
            .replace("{id}", &self.id)
    }

    /// Check selectors, regexes, templates, and output names.
    pub fn validate(&self) -> Result<(), SiteError> {
        let mut problems = Vec::new();

        if let Err(e) = Url::parse(&self.listing_url) {
            problems.push(format!("listing_url '{}': {}", self.listing_url, e));
        }
        if let Err(e) = parse_selector(&self.item) {
            problems.push(format!("item: {}", e));
        }
        for rule in &self.fields {
            problems.extend(rule.problems());
        }
        if let Some(ref identity) = self.identity {
            if !self.fields.iter().any(|f| &f.column == identity) {
                problems.push(format!("identity column '{}' is not a listing field", identity));
            }
        }
        problems.extend(self.pagination.problems());

        if let Some(ref detail) = self.detail {
            problems.extend(detail.link.problems().into_iter().map(|p| format!("detail link {}", p)));
            if let Some(ref anchor) = detail.anchor {
                if let Err(e) = parse_selector(anchor) {
                    problems.push(format!("detail anchor: {}", e));
                }
            }
            for rule in &detail.fields {
                problems.extend(rule.problems().into_iter().map(|p| format!("detail {}", p)));
            }
            if let Some(ref links) = detail.links {
                if let Err(e) = parse_selector(&links.selector) {
                    problems.push(format!("detail links: {}", e));
                }
            }
        }

        let file = self.output_file();
        if OutputFormat::from_path(std::path::Path::new(&file)).is_none() {
            problems.push(format!("output file '{}' has an unsupported extension", file));
        }
        for secondary in &self.output.secondary {
            if OutputFormat::from_path(std::path::Path::new(secondary)).is_none() {
                problems.push(format!(
                    "secondary output '{}' has an unsupported extension",
                    secondary
                ));
            }
        }
        let columns = self.columns();
        for key in &self.output.dedup_by {
            if !columns.contains(key) {
                problems.push(format!("dedup column '{}' is not an output column", key));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(SiteError::Invalid {
                site: self.id.clone(),
                problems,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(toml_src: &str) -> SiteDescriptor {
        let mut site: SiteDescriptor = toml::from_str(toml_src).unwrap();
        site.id = "demo".to_string();
        site
    }

    const DEMO: &str = r#"
name = "Demo Expo"
listing_url = "https://expo.test/exhibitors"
item = "div.card"

[[fields]]
column = "Company Name"
selector = ["h3.name", "h4"]

[[fields]]
column = "Booth Number"
selector = ".stand"

[pagination]
strategy = "infinite-scroll"

[detail]
anchor = "h1"

[detail.link]
column = "URL"
selector = "a.more"
attr = "href"

[[detail.fields]]
column = "Company Name"
selector = "h1"

[detail.links]
selector = ".social"
kinds = ["website", "linkedin"]

[output]
dedup_by = ["Company Name", "Booth Number"]
"#;

    #[test]
    fn test_parse_defaults() {
        let site = descriptor(DEMO);
        assert_eq!(site.engine, Engine::Browser);
        assert_eq!(
            site.pagination,
            Pagination::InfiniteScroll {
                stability_threshold: 3,
                max_items: None,
                max_scrolls: None,
                container: None,
            }
        );
        assert_eq!(site.output_file(), "demo.xlsx");
        assert_eq!(site.identity_column(), Some("Company Name"));
        site.validate().unwrap();
    }

    #[test]
    fn test_columns_are_ordered_and_unique() {
        let site = descriptor(DEMO);
        assert_eq!(
            site.columns(),
            vec![
                "Order",
                "Page",
                "Position",
                "Company Name",
                "Booth Number",
                "URL",
                "Website",
                "LinkedIn"
            ]
        );
    }

    #[test]
    fn test_listing_spec_without_detail() {
        let site = descriptor(DEMO);
        assert!(site.listing_spec(None, "", true).detail_link.is_some());
        assert!(site.listing_spec(None, "", false).detail_link.is_none());
    }

    #[test]
    fn test_validate_collects_problems() {
        let mut site = descriptor(DEMO);
        site.item = "div[".to_string();
        site.pagination = Pagination::QueryParam {
            url_template: "https://expo.test/?p=1".to_string(),
            start_page: 1,
            max_pages: None,
            stop_on_empty: false,
        };
        site.output.file = Some("out.pdf".to_string());
        match site.validate() {
            Err(SiteError::Invalid { problems, .. }) => assert_eq!(problems.len(), 4),
            other => panic!("expected invalid, got {:?}", other),
        }
    }

    #[test]
    fn test_page_count_requires_a_bound() {
        let pagination = Pagination::PageCount {
            indicator: None,
            total_pages: None,
            url_template: Some("https://expo.test/?page={page}".to_string()),
            next: None,
        };
        assert_eq!(pagination.problems().len(), 1);
        assert_eq!(page_url("https://expo.test/?page={page}", 3), "https://expo.test/?page=3");
    }

    #[test]
    fn test_scroll_container_is_validated() {
        let pagination: Pagination = toml::from_str(
            "strategy = \"infinite-scroll\"\ncontainer = \"div[data-testid='marketplaceBlock']\"",
        )
        .unwrap();
        assert!(pagination.problems().is_empty());
        assert!(matches!(
            pagination,
            Pagination::InfiniteScroll { container: Some(ref c), stability_threshold: 3, .. }
                if c == "div[data-testid='marketplaceBlock']"
        ));

        let broken = Pagination::InfiniteScroll {
            stability_threshold: 3,
            max_items: None,
            max_scrolls: None,
            container: Some("div[".to_string()),
        };
        assert_eq!(broken.problems().len(), 1);
    }
}
