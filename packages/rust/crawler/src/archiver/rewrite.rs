//! Streaming rewrite of an article page for offline reading.
//!
//! Everything the rewrite needs from the network (stylesheet bodies, local
//! image paths) is resolved beforehand and passed in a [`RewritePlan`], so
//! this pass is synchronous and deterministic.

use std::cell::Cell;
use std::collections::HashMap;

use lol_html::html_content::ContentType;
use lol_html::{HtmlRewriter, Settings, element};

use mparchive_shared::{ArchiveError, Result};

use super::matcher::{NodeView, VideoMatchers, decode_entities};
use super::scan::is_stylesheet;

/// `id` of the injected override stylesheet.
pub const OVERRIDE_STYLE_ID: &str = "mparchive-offline";

const META_CHARSET: &str = r#"<meta charset="utf-8">"#;

/// Forces content hidden until scripts run to show, and gives the page a
/// readable layout without the platform's scripts.
const OVERRIDE_CSS: &str = r#"
.rich_media_area_primary_inner, #js_content, body, .rich_media_content {
    visibility: visible !important;
    opacity: 1 !important;
}
#js_loading { display: none !important; }
body {
    font-family: -apple-system, system-ui, "Segoe UI", Roboto, "Helvetica Neue", Arial, sans-serif;
    line-height: 1.8;
    padding: 20px;
    background-color: #f6f6f6;
    color: #333;
}
#js_content, #img-content, .rich_media_area_primary_inner {
    max-width: 677px;
    margin: 0 auto;
    background-color: #fff;
    padding: 40px;
    border: 1px solid #e7e7eb;
}
.rich_media_title {
    font-size: 22px;
    font-weight: 700;
    margin-bottom: 20px;
    line-height: 1.4;
}
img {
    max-width: 100% !important;
    height: auto !important;
    display: block;
    margin: 20px auto;
    border-radius: 4px;
}
p {
    margin-bottom: 1.5em;
    text-align: justify;
    font-size: 16px;
}
"#;

/// Inputs resolved before the rewrite.
pub struct RewritePlan<'a> {
    pub matchers: &'a VideoMatchers,
    /// Stylesheet bodies to inline, in document order.
    pub inline_css: &'a [String],
    /// `data-src` → local reference for every image that was saved.
    pub images: &'a HashMap<String, String>,
    /// Skip the charset meta when the page already declares one.
    pub has_charset: bool,
}

/// Rewrite `html` according to `plan`.
pub fn rewrite(html: &str, plan: &RewritePlan<'_>) -> Result<String> {
    let charset = if plan.has_charset { "" } else { META_CHARSET };
    let head_tail = head_tail(plan.inline_css);
    let head_seen = Cell::new(false);

    let output = run(
        html,
        Settings {
            element_content_handlers: vec![
                // Videos first, so the iframe sweep below never sees them.
                element!("*", |el| {
                    if let Some(kind) = plan.matchers.classify(&NodeView::from_rewriter(el)) {
                        el.replace(&kind.placeholder_html(), ContentType::Html);
                    }
                    Ok(())
                }),
                element!("script", |el| {
                    el.remove();
                    Ok(())
                }),
                element!("iframe", |el| {
                    if !el.removed() {
                        el.remove();
                    }
                    Ok(())
                }),
                element!("link[rel]", |el| {
                    if is_stylesheet(&NodeView::from_rewriter(el)) {
                        el.remove();
                    }
                    Ok(())
                }),
                element!("[onerror]", |el| {
                    el.remove_attribute("onerror");
                    Ok(())
                }),
                element!("style#mparchive-offline", |el| {
                    el.remove();
                    Ok(())
                }),
                element!("head", |el| {
                    if !head_seen.replace(true) {
                        el.prepend(charset, ContentType::Html);
                        el.append(&head_tail, ContentType::Html);
                    }
                    Ok(())
                }),
                element!("img[data-src]", |el| {
                    let local = el
                        .get_attribute("data-src")
                        .and_then(|src| plan.images.get(decode_entities(&src).trim()).cloned());
                    if let Some(local) = local {
                        el.set_attribute("src", &local)?;
                        el.set_attribute("data-src", &local)?;
                    }
                    Ok(())
                }),
            ],
            ..Settings::default()
        },
    )?;

    if head_seen.get() {
        return Ok(output);
    }

    // No <head> in the source: create one inside <html>, or in front of everything.
    let head = format!("<head>{charset}{head_tail}</head>");
    let html_seen = Cell::new(false);
    let with_head = run(
        &output,
        Settings {
            element_content_handlers: vec![element!("html", |el| {
                if !html_seen.replace(true) {
                    el.prepend(&head, ContentType::Html);
                }
                Ok(())
            })],
            ..Settings::default()
        },
    )?;

    if html_seen.get() {
        Ok(with_head)
    } else {
        Ok(format!("{head}{output}"))
    }
}

/// Inlined stylesheets followed by the override stylesheet.
fn head_tail(inline_css: &[String]) -> String {
    let mut tail = String::new();
    for css in inline_css {
        tail.push_str("<style>");
        tail.push_str(&css.replace("</style", "<\\/style"));
        tail.push_str("</style>");
    }
    tail.push_str(&format!(r#"<style id="{OVERRIDE_STYLE_ID}">{OVERRIDE_CSS}</style>"#));
    tail
}

fn run(html: &str, settings: Settings<'_, '_>) -> Result<String> {
    let mut output = Vec::with_capacity(html.len());
    let mut rewriter = HtmlRewriter::new(settings, |c: &[u8]| output.extend_from_slice(c));
    rewriter
        .write(html.as_bytes())
        .map_err(|e| ArchiveError::parse(format!("HTML rewrite error: {e}")))?;
    rewriter
        .end()
        .map_err(|e| ArchiveError::parse(format!("HTML rewrite finalization error: {e}")))?;
    String::from_utf8(output).map_err(|e| ArchiveError::parse(format!("rewritten HTML is not UTF-8: {e}")))
}
