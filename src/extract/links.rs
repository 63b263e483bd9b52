//! Outbound link classification.

use scraper::ElementRef;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{parse_selector, ExtractError};
use crate::models::{columns, FieldValues};

/// Category of an outbound exhibitor link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Website,
    Linkedin,
    Facebook,
    Instagram,
    Youtube,
    Twitter,
    Email,
    Phone,
}

impl LinkKind {
    pub const ALL: [LinkKind; 8] = [
        LinkKind::Website,
        LinkKind::Linkedin,
        LinkKind::Facebook,
        LinkKind::Instagram,
        LinkKind::Youtube,
        LinkKind::Twitter,
        LinkKind::Email,
        LinkKind::Phone,
    ];

    /// Output column for this kind.
    pub fn column(self) -> &'static str {
        match self {
            LinkKind::Website => columns::WEBSITE,
            LinkKind::Linkedin => columns::LINKEDIN,
            LinkKind::Facebook => columns::FACEBOOK,
            LinkKind::Instagram => columns::INSTAGRAM,
            LinkKind::Youtube => columns::YOUTUBE,
            LinkKind::Twitter => columns::TWITTER,
            LinkKind::Email => columns::EMAIL,
            LinkKind::Phone => columns::PHONE,
        }
    }

    fn all() -> Vec<LinkKind> {
        Self::ALL.to_vec()
    }
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// Classify an href. Returns None for links that are neither absolute
/// http(s) URLs nor `mailto:`/`tel:` links.
pub fn classify_link(href: &str) -> Option<LinkKind> {
    let href = href.trim();
    let lower = href.to_ascii_lowercase();
    if lower.starts_with("mailto:") {
        return Some(LinkKind::Email);
    }
    if lower.starts_with("tel:") {
        return Some(LinkKind::Phone);
    }
    if !lower.starts_with("http://") && !lower.starts_with("https://") {
        return None;
    }

    let url = Url::parse(href).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    let kind = if host_matches(&host, "linkedin.com") {
        LinkKind::Linkedin
    } else if host_matches(&host, "facebook.com") || host_matches(&host, "fb.com") {
        LinkKind::Facebook
    } else if host_matches(&host, "instagram.com") {
        LinkKind::Instagram
    } else if host_matches(&host, "youtube.com") || host_matches(&host, "youtu.be") {
        LinkKind::Youtube
    } else if host_matches(&host, "twitter.com") || host_matches(&host, "x.com") {
        LinkKind::Twitter
    } else {
        LinkKind::Website
    };
    Some(kind)
}

/// Cell value for a classified link.
pub fn link_value(kind: LinkKind, href: &str) -> String {
    let href = href.trim();
    let strip = |prefix: &str| {
        let rest = &href[prefix.len()..];
        rest.split('?').next().unwrap_or(rest).trim().to_string()
    };
    match kind {
        LinkKind::Email if href.len() >= 7 => strip("mailto:"),
        LinkKind::Phone if href.len() >= 4 => strip("tel:"),
        _ => href.to_string(),
    }
}

/// Sorts every link under a container into per-kind columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRule {
    /// Container (or anchor) selector; anchors beneath matches are collected.
    pub selector: String,

    /// Kinds to keep; all kinds when omitted.
    #[serde(default = "LinkKind::all")]
    pub kinds: Vec<LinkKind>,
}

impl LinkRule {
    pub fn columns(&self) -> Vec<&'static str> {
        self.kinds.iter().map(|k| k.column()).collect()
    }

    /// Collect the first link of each configured kind.
    ///
    /// Links back to the listing site's own host are not counted as websites.
    pub fn extract(&self, scope: ElementRef<'_>, base: Option<&Url>) -> Result<FieldValues, ExtractError> {
        let container = parse_selector(&self.selector)?;
        let anchor = parse_selector("a[href]")?;
        let own_host = base.and_then(|b| b.host_str()).map(|h| h.to_ascii_lowercase());

        let mut found: FieldValues = Vec::new();
        let mut consider = |href: &str| {
            let Some(kind) = classify_link(href) else {
                return;
            };
            if !self.kinds.contains(&kind) || found.iter().any(|(c, _)| c == kind.column()) {
                return;
            }
            if kind == LinkKind::Website {
                let host = Url::parse(href.trim())
                    .ok()
                    .and_then(|u| u.host_str().map(|h| h.to_ascii_lowercase()));
                if host.is_some() && host == own_host {
                    return;
                }
            }
            found.push((kind.column().to_string(), link_value(kind, href)));
        };

        for el in scope.select(&container) {
            if el.value().name() == "a" {
                if let Some(href) = el.value().attr("href") {
                    consider(href);
                }
                continue;
            }
            for a in el.select(&anchor) {
                if let Some(href) = a.value().attr("href") {
                    consider(href);
                }
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_classify_link() {
        assert_eq!(
            classify_link("https://www.linkedin.com/company/acme"),
            Some(LinkKind::Linkedin)
        );
        assert_eq!(classify_link("https://x.com/acme"), Some(LinkKind::Twitter));
        assert_eq!(classify_link("https://youtu.be/abc"), Some(LinkKind::Youtube));
        assert_eq!(classify_link("mailto:info@acme.test"), Some(LinkKind::Email));
        assert_eq!(classify_link("tel:+971 4 000"), Some(LinkKind::Phone));
        assert_eq!(classify_link("https://acme.test"), Some(LinkKind::Website));
        assert_eq!(classify_link("https://notx.com"), Some(LinkKind::Website));
        assert_eq!(classify_link("/exhibitors/12"), None);
        assert_eq!(classify_link("javascript:void(0)"), None);
    }

    #[test]
    fn test_link_value_strips_schemes() {
        assert_eq!(
            link_value(LinkKind::Email, "mailto:info@acme.test?subject=hi"),
            "info@acme.test"
        );
        assert_eq!(link_value(LinkKind::Phone, "tel:+97140000"), "+97140000");
    }

    #[test]
    fn test_extract_first_of_each_kind() {
        let html = Html::parse_document(
            r#"<div class="contacts">
                 <a href="https://expo.test/back">Back</a>
                 <a href="https://acme.test">Site</a>
                 <a href="https://other.test">Second site</a>
                 <a href="https://linkedin.com/company/acme">in</a>
                 <a href="mailto:hi@acme.test">Mail</a>
               </div>"#,
        );
        let rule = LinkRule {
            selector: ".contacts".to_string(),
            kinds: LinkKind::all(),
        };
        let base = Url::parse("https://expo.test/exhibitors").unwrap();
        let values = rule.extract(html.root_element(), Some(&base)).unwrap();
        assert_eq!(
            values,
            vec![
                ("Website".to_string(), "https://acme.test".to_string()),
                (
                    "LinkedIn".to_string(),
                    "https://linkedin.com/company/acme".to_string()
                ),
                ("Email".to_string(), "hi@acme.test".to_string()),
            ]
        );
    }
}
