//! Read-only extraction from a raw article page.
//!
//! The resolver needs the owning account (id or display name) and the
//! single-article mode needs the title; both come from the same page shape.

use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};

/// Patterns that expose the account id inside inline scripts, tried in order.
static BIZ_PATTERNS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(r#"var\s+biz\s*=\s*"([^"]+)""#).expect("valid regex"),
        Regex::new(r#""biz"\s*:\s*"([^"]+)""#).expect("valid regex"),
        Regex::new(r#"__biz=([^&"\\]+)"#).expect("valid regex"),
    ]
});

/// Facts pulled from one article page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArticlePage {
    /// Account id found in inline script content.
    pub biz: Option<String>,
    /// Display name of the publishing account.
    pub account_name: Option<String>,
    /// Article title.
    pub title: Option<String>,
}

impl ArticlePage {
    /// Parse the page. Owned output only, so callers never hold the DOM across awaits.
    pub fn parse(html: &str) -> Self {
        let doc = Html::parse_document(html);
        Self {
            biz: extract_biz(&doc),
            account_name: extract_account_name(&doc),
            title: extract_title(&doc),
        }
    }
}

/// Concatenated text of inline (no `src`) scripts.
fn inline_script_text(doc: &Html) -> String {
    let sel = Selector::parse("script:not([src])").unwrap();
    doc.select(&sel)
        .map(|el| el.text().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

fn extract_biz(doc: &Html) -> Option<String> {
    let scripts = inline_script_text(doc);
    BIZ_PATTERNS
        .iter()
        .find_map(|re| re.captures(&scripts))
        .map(|caps| caps[1].trim().to_string())
        .filter(|biz| !biz.is_empty())
}

/// `#js_name`, then the author meta tag, then the nickname span.
fn extract_account_name(doc: &Html) -> Option<String> {
    let by_id = Selector::parse("#js_name").unwrap();
    let by_meta = Selector::parse(r#"meta[property="og:article:author"]"#).unwrap();
    let by_class = Selector::parse(".rich_media_meta_nickname").unwrap();

    first_text(doc, &by_id)
        .or_else(|| first_attr(doc, &by_meta, "content"))
        .or_else(|| first_text(doc, &by_class))
}

/// `og:title`, then `#activity-name`, then `<title>`.
fn extract_title(doc: &Html) -> Option<String> {
    let og = Selector::parse(r#"meta[property="og:title"]"#).unwrap();
    let activity = Selector::parse("#activity-name").unwrap();
    let title = Selector::parse("title").unwrap();

    first_attr(doc, &og, "content")
        .or_else(|| first_text(doc, &activity))
        .or_else(|| first_text(doc, &title))
}

fn first_text(doc: &Html, sel: &Selector) -> Option<String> {
    doc.select(sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn first_attr(doc: &Html, sel: &Selector, attr: &str) -> Option<String> {
    doc.select(sel)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
