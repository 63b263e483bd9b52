//! HTML extraction over page snapshots.
//!
//! Everything here is synchronous and works on an HTML string taken from the
//! session, so parsed documents never live across an await point.

mod links;
mod rule;
mod text;

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;
use url::Url;

use crate::models::FieldValues;

pub use links::{classify_link, link_value, LinkKind, LinkRule};
pub use rule::{labelled_value, pick_line, FieldRule, SelectorList};
pub use text::{element_lines, element_text};

/// Longest identity derived from an item's raw text.
const IDENTITY_MAX_CHARS: usize = 120;

/// Errors in selectors or patterns.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// Why a single listing item could not be turned into a record.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ItemError {
    #[error("required field '{column}' is missing")]
    MissingRequired { column: String },

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error("detail page failed: {0}")]
    Detail(String),
}

pub fn parse_selector(selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|e| ExtractError::InvalidSelector {
        selector: selector.to_string(),
        message: e.to_string(),
    })
}

/// Number of elements matching `selector`.
pub fn count_matches(html: &str, selector: &str) -> Result<usize, ExtractError> {
    let selector = parse_selector(selector)?;
    Ok(Html::parse_document(html).select(&selector).count())
}

/// Visible text of the first element matching `selector`.
pub fn first_text(html: &str, selector: &str) -> Result<Option<String>, ExtractError> {
    let selector = parse_selector(selector)?;
    let doc = Html::parse_document(html);
    Ok(doc
        .select(&selector)
        .next()
        .map(element_text)
        .filter(|t| !t.is_empty()))
}

/// Total page count from an indicator such as "Page 1 of 4".
pub fn parse_page_total(text: &str) -> Option<u32> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)\bof\s+(\d+)").ok()).as_ref()?;
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// State of a pagination control in a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlState {
    Missing,
    Disabled,
    Enabled,
}

/// Inspect the last element matching `selector`.
///
/// A `disabled` attribute, `aria-disabled="true"`, or a class containing
/// "disabled" all count as disabled.
pub fn control_state(html: &str, selector: &str) -> Result<ControlState, ExtractError> {
    let selector = parse_selector(selector)?;
    let doc = Html::parse_document(html);
    let Some(control) = doc.select(&selector).last() else {
        return Ok(ControlState::Missing);
    };
    let el = control.value();
    let disabled = el.attr("disabled").is_some()
        || el
            .attr("aria-disabled")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        || el.classes().any(|c| c.to_ascii_lowercase().contains("disabled"));
    Ok(if disabled {
        ControlState::Disabled
    } else {
        ControlState::Enabled
    })
}

/// What the listing walker needs to summarise items.
#[derive(Debug, Clone, Copy)]
pub struct ListingSpec<'a> {
    pub item: &'a str,
    pub fields: &'a [FieldRule],
    /// Column whose value identifies an item for change detection.
    pub identity: Option<&'a str>,
    pub detail_link: Option<&'a FieldRule>,
    pub base: Option<&'a Url>,
    pub missing: &'a str,
}

/// Directly available summary of one listing item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingItem {
    /// 1-based position on its page.
    pub position: usize,
    pub identity: String,
    pub fields: FieldValues,
    pub detail_url: Option<String>,
}

/// An item that could not be summarised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedItem {
    pub position: usize,
    pub identity: String,
    pub error: ItemError,
}

pub type ItemResult = Result<ListingItem, SkippedItem>;

/// Apply field rules to a scope. Missing optional fields become `missing`.
pub fn extract_fields(
    scope: ElementRef<'_>,
    rules: &[FieldRule],
    missing: &str,
) -> Result<FieldValues, ItemError> {
    let mut values = Vec::with_capacity(rules.len());
    for rule in rules {
        let value = match rule.extract(scope) {
            Ok(Some(v)) => v,
            Ok(None) if rule.required => {
                return Err(ItemError::MissingRequired {
                    column: rule.column.clone(),
                })
            }
            Ok(None) => missing.to_string(),
            Err(e) if rule.required => return Err(e.into()),
            Err(e) => {
                tracing::warn!("Field '{}' skipped: {}", rule.column, e);
                missing.to_string()
            }
        };
        values.push((rule.column.clone(), value));
    }
    Ok(values)
}

fn identity_of(scope: ElementRef<'_>, fields: &FieldValues, spec: &ListingSpec<'_>) -> String {
    let column = spec
        .identity
        .or_else(|| spec.fields.first().map(|f| f.column.as_str()));
    if let Some(column) = column {
        if let Some((_, v)) = fields.iter().find(|(c, v)| c == column && v != spec.missing) {
            return v.clone();
        }
    }
    element_text(scope).chars().take(IDENTITY_MAX_CHARS).collect()
}

fn summarise(scope: ElementRef<'_>, position: usize, spec: &ListingSpec<'_>) -> ItemResult {
    let skipped = |identity: String, error: ItemError| SkippedItem {
        position,
        identity,
        error,
    };

    let fields = match extract_fields(scope, spec.fields, spec.missing) {
        Ok(fields) => fields,
        Err(error) => {
            let identity = element_text(scope).chars().take(IDENTITY_MAX_CHARS).collect();
            return Err(skipped(identity, error));
        }
    };
    let identity = identity_of(scope, &fields, spec);

    let detail_url = match spec.detail_link {
        Some(rule) => match rule.extract(scope) {
            Ok(Some(href)) => Some(resolve_url(spec.base, &href)),
            Ok(None) => None,
            Err(e) => return Err(skipped(identity, e.into())),
        },
        None => None,
    };

    Ok(ListingItem {
        position,
        identity,
        fields,
        detail_url,
    })
}

/// Resolve a possibly relative href against the page URL.
pub fn resolve_url(base: Option<&Url>, href: &str) -> String {
    let href = href.trim();
    match base {
        Some(base) => base
            .join(href)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string()),
        None => href.to_string(),
    }
}

/// Summarise every item in a listing snapshot, in document order.
pub fn listing_items(html: &str, spec: &ListingSpec<'_>) -> Result<Vec<ItemResult>, ExtractError> {
    let item = parse_selector(spec.item)?;
    let doc = Html::parse_document(html);
    Ok(doc
        .select(&item)
        .enumerate()
        .map(|(idx, scope)| summarise(scope, idx + 1, spec))
        .collect())
}

/// Identity of the first item in a snapshot, if any item is present.
pub fn first_identity(html: &str, spec: &ListingSpec<'_>) -> Result<Option<String>, ExtractError> {
    let item = parse_selector(spec.item)?;
    let doc = Html::parse_document(html);
    Ok(doc.select(&item).next().map(|scope| match summarise(scope, 1, spec) {
        Ok(item) => item.identity,
        Err(skipped) => skipped.identity,
    }))
}

/// Extract detail-page fields and classified links from a full document.
/// Every field is independently optional.
pub fn detail_fields(
    html: &str,
    fields: &[FieldRule],
    links: Option<&LinkRule>,
    base: Option<&Url>,
    missing: &str,
) -> FieldValues {
    let doc = Html::parse_document(html);
    let root = doc.root_element();

    let mut values: FieldValues = fields
        .iter()
        .map(|rule| {
            let value = match rule.extract(root) {
                Ok(Some(v)) => v,
                Ok(None) => missing.to_string(),
                Err(e) => {
                    tracing::warn!("Detail field '{}' skipped: {}", rule.column, e);
                    missing.to_string()
                }
            };
            (rule.column.clone(), value)
        })
        .collect();

    if let Some(rule) = links {
        let found = match rule.extract(root, base) {
            Ok(found) => found,
            Err(e) => {
                tracing::warn!("Link classification skipped: {}", e);
                Vec::new()
            }
        };
        for column in rule.columns() {
            let value = found
                .iter()
                .find(|(c, _)| c == column)
                .map(|(_, v)| v.clone())
                .unwrap_or_else(|| missing.to_string());
            values.push((column.to_string(), value));
        }
    }
    values
}
