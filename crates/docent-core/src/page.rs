//! Visible text of the page the reader is on, used as extra prompt context.

use scraper::{ElementRef, Html, Node, Selector};

const CONTENT_SELECTOR: &str = "main#content";
const BODY_SELECTOR: &str = "body";
const SKIPPED_TAGS: &[&str] = &["script", "style", "noscript", "template"];

/// Text of `main#content`, else `<body>`, else the whole document.
pub fn browsing_content(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = [CONTENT_SELECTOR, BODY_SELECTOR]
        .iter()
        .filter_map(|s| Selector::parse(s).ok())
        .find_map(|selector| document.select(&selector).next())
        .unwrap_or_else(|| document.root_element());

    let mut raw = String::new();
    collect_text(root, &mut raw);
    clean_text(&raw)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            // Source line breaks are plain whitespace; only block edges break lines.
            Node::Text(text) => out.push_str(&text.replace('\n', " ")),
            Node::Element(el) => {
                if SKIPPED_TAGS.contains(&el.name()) {
                    continue;
                }
                let block = is_block(el.name());
                if block {
                    out.push('\n');
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

fn is_block(tag: &str) -> bool {
    matches!(
        tag,
        "p" | "div" | "section" | "article" | "main" | "header" | "footer" | "nav" | "li"
            | "ul" | "ol" | "pre" | "table" | "tr" | "br" | "h1" | "h2" | "h3" | "h4" | "h5"
            | "h6" | "blockquote"
    )
}

/// Collapse whitespace within lines and drop blank lines.
fn clean_text(raw: &str) -> String {
    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
