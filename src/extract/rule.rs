//! Declarative field rules.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{ElementRef, Selector};
use serde::{Deserialize, Serialize};

use super::text::element_lines;
use super::{parse_selector, ExtractError};

/// One selector or an ordered fallback chain of selectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorList {
    One(String),
    Many(Vec<String>),
}

impl SelectorList {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let items: Vec<&str> = match self {
            SelectorList::One(s) => vec![s.as_str()],
            SelectorList::Many(v) => v.iter().map(|s| s.as_str()).collect(),
        };
        items.into_iter()
    }
}

/// Parsed selectors and pattern of a rule.
#[derive(Debug, Clone)]
struct Matchers {
    selectors: Vec<Selector>,
    closest: Option<Selector>,
    pattern: Option<Regex>,
}

/// Matchers built on the first extraction and reused after that.
#[derive(Debug, Clone, Default)]
struct Compiled(OnceLock<Result<Matchers, ExtractError>>);

impl PartialEq for Compiled {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

/// How to produce one column's value from an element scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    /// Output column name.
    pub column: String,

    /// Selector or fallback chain; the scope element itself when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<SelectorList>,

    /// Move from each match to its nearest ancestor matching this selector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closest: Option<String>,

    /// Read this attribute instead of the visible text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attr: Option<String>,

    /// Take the line following a label (or the text after `label:`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Pick one visible line; negative values count from the end.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<i32>,

    /// Regex applied to the value; capture group 1 if present, else the whole match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,

    /// Output template, `{}` is replaced by the value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,

    /// Join every match with this separator instead of taking the first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<String>,

    /// Truncate to this many characters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,

    /// Skip the whole item when this field is missing.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,

    #[serde(skip)]
    compiled: Compiled,
}

impl FieldRule {
    pub fn new(column: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            selector: Some(SelectorList::One(selector.into())),
            ..Default::default()
        }
    }

    pub fn attr(mut self, attr: impl Into<String>) -> Self {
        self.attr = Some(attr.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Every selector this rule references.
    pub fn selectors(&self) -> Vec<&str> {
        let mut all: Vec<&str> = self.selector.iter().flat_map(|s| s.iter()).collect();
        if let Some(ref closest) = self.closest {
            all.push(closest);
        }
        all
    }

    /// Describe every problem with this rule.
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.column.trim().is_empty() {
            problems.push("field with empty column name".to_string());
        }
        for sel in self.selectors() {
            if let Err(e) = parse_selector(sel) {
                problems.push(format!("{}: {}", self.column, e));
            }
        }
        if let Some(ref pattern) = self.pattern {
            if let Err(e) = Regex::new(pattern) {
                problems.push(format!("{}: invalid pattern '{}': {}", self.column, pattern, e));
            }
        }
        if let Some(ref template) = self.template {
            if !template.contains("{}") {
                problems.push(format!(
                    "{}: template '{}' has no {{}} placeholder",
                    self.column, template
                ));
            }
        }
        if self.attr.is_some() && (self.label.is_some() || self.line.is_some()) {
            problems.push(format!(
                "{}: attr cannot be combined with label or line",
                self.column
            ));
        }
        problems
    }

    fn compile(&self) -> Result<Matchers, ExtractError> {
        let selectors = self
            .selector
            .iter()
            .flat_map(|s| s.iter())
            .map(parse_selector)
            .collect::<Result<Vec<_>, _>>()?;
        let closest = self.closest.as_deref().map(parse_selector).transpose()?;
        let pattern = self
            .pattern
            .as_deref()
            .map(|p| {
                Regex::new(p).map_err(|e| ExtractError::InvalidPattern {
                    pattern: p.to_string(),
                    message: e.to_string(),
                })
            })
            .transpose()?;
        Ok(Matchers {
            selectors,
            closest,
            pattern,
        })
    }

    /// Extract the value from `scope`. `Ok(None)` means nothing usable matched.
    ///
    /// Selectors and the pattern are compiled on the first call, so a rule
    /// should not be edited once it has been used.
    pub fn extract(&self, scope: ElementRef<'_>) -> Result<Option<String>, ExtractError> {
        let matchers = self
            .compiled
            .0
            .get_or_init(|| self.compile())
            .as_ref()
            .map_err(Clone::clone)?;
        let closest = matchers.closest.as_ref();
        let pattern = matchers.pattern.as_ref();

        let mut values = Vec::new();
        if self.selector.is_none() {
            values.extend(self.value_of(scope, closest, pattern));
        }
        for selector in &matchers.selectors {
            values = scope
                .select(selector)
                .filter_map(|el| self.value_of(el, closest, pattern))
                .collect();
            if !values.is_empty() {
                break;
            }
        }

        let value = match self.join {
            Some(ref sep) => values.join(sep),
            None => match values.into_iter().next() {
                Some(v) => v,
                None => return Ok(None),
            },
        };
        let value = match self.max_len {
            Some(max) if value.chars().count() > max => {
                value.chars().take(max).collect::<String>().trim_end().to_string()
            }
            _ => value,
        };
        Ok(Some(value).filter(|v| !v.is_empty()))
    }

    fn value_of(
        &self,
        el: ElementRef<'_>,
        closest: Option<&Selector>,
        pattern: Option<&Regex>,
    ) -> Option<String> {
        let el = match closest {
            Some(sel) => el.ancestors().filter_map(ElementRef::wrap).find(|a| sel.matches(a))?,
            None => el,
        };

        let raw = match self.attr {
            Some(ref attr) => el.value().attr(attr).map(|v| v.trim().to_string()),
            None => {
                let lines = element_lines(el);
                if let Some(ref label) = self.label {
                    labelled_value(&lines, label)
                } else if let Some(idx) = self.line {
                    pick_line(&lines, idx)
                } else {
                    Some(lines.join(" "))
                }
            }
        }?;

        let raw = match pattern {
            Some(re) => {
                let caps = re.captures(&raw)?;
                caps.get(1).or_else(|| caps.get(0))?.as_str().trim().to_string()
            }
            None => raw,
        };
        if raw.is_empty() {
            return None;
        }

        Some(match self.template {
            Some(ref template) => template.replace("{}", &raw),
            None => raw,
        })
    }
}

/// Value following `label` in a list of lines: the rest of the label line
/// when it carries one (`Location: Dubai`), otherwise the next line.
pub fn labelled_value(lines: &[String], label: &str) -> Option<String> {
    let needle = label.trim().trim_end_matches(':');
    if needle.is_empty() {
        return None;
    }
    for (i, line) in lines.iter().enumerate() {
        let n = needle.len();
        if line.len() < n || !line.is_char_boundary(n) || !line[..n].eq_ignore_ascii_case(needle)
        {
            continue;
        }
        let rest = line[n..].trim_start_matches(|c: char| c == ':' || c.is_whitespace());
        if !line[n..].is_empty() && rest.len() == line[n..].len() {
            // Label is only a prefix of a longer word.
            continue;
        }
        if !rest.is_empty() {
            return Some(rest.trim().to_string());
        }
        return lines.get(i + 1).cloned();
    }
    None
}

/// Line at `idx`, negative indexes counting from the end.
pub fn pick_line(lines: &[String], idx: i32) -> Option<String> {
    let len = lines.len() as i64;
    let idx = i64::from(idx);
    let pos = if idx < 0 { len + idx } else { idx };
    if pos < 0 || pos >= len {
        return None;
    }
    lines.get(pos as usize).cloned()
}
