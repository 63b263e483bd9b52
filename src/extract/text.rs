//! Rendered-text approximation for HTML elements.

use scraper::{ElementRef, Node};

/// Elements that start and end a visual line.
const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "dd",
    "div",
    "dl",
    "dt",
    "figcaption",
    "figure",
    "footer",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "li",
    "main",
    "nav",
    "ol",
    "p",
    "section",
    "table",
    "td",
    "th",
    "tr",
    "ul",
];

/// Elements whose content is never visible text.
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Visible lines of an element, whitespace collapsed, empty lines dropped.
///
/// Line breaks come from `<br>` and block-level elements only; newlines in
/// the markup itself are treated as ordinary whitespace.
pub fn element_lines(el: ElementRef<'_>) -> Vec<String> {
    let mut raw = String::new();
    collect(el, &mut raw);
    raw.split('\n')
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect()
}

/// Single-line visible text of an element.
pub fn element_text(el: ElementRef<'_>) -> String {
    element_lines(el).join(" ")
}

fn collect(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                out.extend(text.chars().map(|c| if c.is_whitespace() { ' ' } else { c }));
            }
            Node::Element(element) => {
                let name = element.name();
                if SKIPPED_TAGS.contains(&name) {
                    continue;
                }
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                let block = BLOCK_TAGS.contains(&name);
                if block {
                    out.push('\n');
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect(child_el, out);
                }
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    fn first(html: &str, sel: &str) -> Vec<String> {
        let doc = Html::parse_fragment(html);
        let selector = Selector::parse(sel).unwrap();
        let el = doc.select(&selector).next().unwrap();
        element_lines(el)
    }

    #[test]
    fn test_breaks_on_br_and_blocks() {
        let lines = first(
            r#"<div class="addr">Unit 4<br>
                 Al Quoz   Industrial
                 <p>Dubai</p><span>United Arab</span> <b>Emirates</b></div>"#,
            ".addr",
        );
        assert_eq!(
            lines,
            vec!["Unit 4", "Al Quoz Industrial", "Dubai", "United Arab Emirates"]
        );
    }

    #[test]
    fn test_skips_scripts() {
        let lines = first(
            r#"<div id="x">Name<script>var a = 1;</script></div>"#,
            "#x",
        );
        assert_eq!(lines, vec!["Name"]);
    }

    #[test]
    fn test_element_text_joins_lines() {
        let doc = Html::parse_fragment("<h4>Acme<br>Trading</h4>");
        let sel = Selector::parse("h4").unwrap();
        let el = doc.select(&sel).next().unwrap();
        assert_eq!(element_text(el), "Acme Trading");
    }
}
