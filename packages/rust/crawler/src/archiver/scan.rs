//! Read-only pre-scan of an article page.
//!
//! Collects what must be fetched before the rewrite: stylesheet links and
//! images in document order. Video subtrees are skipped entirely since the
//! rewrite replaces them.

use scraper::{ElementRef, Html};

use crate::fetch::absolutize;

use super::matcher::{NodeView, VideoMatchers};

/// One `<img>` that carries a remote source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    /// Position among all images outside video nodes.
    pub index: usize,
    /// Entity-decoded `data-src`, the key the rewrite looks images up by.
    pub data_src: String,
    /// `data-src` resolved against the page URL.
    pub url: String,
    pub data_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageScan {
    /// Absolute stylesheet URLs, document order.
    pub stylesheets: Vec<String>,
    pub images: Vec<ImageRef>,
    /// Whether a `meta[charset]` is already present.
    pub has_charset: bool,
    /// Outermost video nodes that will be replaced.
    pub videos: usize,
    image_count: usize,
}

impl PageScan {
    /// Scan the page fetched from `page_url`.
    pub fn run(html: &str, page_url: &str, matchers: &VideoMatchers) -> Self {
        let doc = Html::parse_document(html);
        let mut scan = Self::default();

        // Explicit stack: nesting depth is controlled by the page.
        let mut stack = vec![doc.root_element()];
        while let Some(el) = stack.pop() {
            if scan.visit(el, page_url, matchers) {
                stack.extend(el.children().rev().filter_map(ElementRef::wrap));
            }
        }
        scan
    }

    /// Record one element; `false` when its subtree must be skipped.
    fn visit(&mut self, el: ElementRef<'_>, page_url: &str, matchers: &VideoMatchers) -> bool {
        let node = NodeView::from_scraper(el);
        if matchers.classify(&node).is_some() {
            self.videos += 1;
            return false;
        }

        match node.tag.as_str() {
            "img" => {
                let index = self.image_count;
                self.image_count += 1;
                if let Some(src) = node.attr("data-src").map(str::trim).filter(|s| !s.is_empty()) {
                    self.images.push(ImageRef {
                        index,
                        data_src: src.to_string(),
                        url: absolutize(src, page_url),
                        data_type: node.attr("data-type").map(str::to_string),
                    });
                }
            }
            "link" if is_stylesheet(&node) => {
                if let Some(href) = node.attr("href").map(str::trim).filter(|h| !h.is_empty()) {
                    self.stylesheets.push(absolutize(href, page_url));
                }
            }
            "meta" if node.has_attr("charset") => self.has_charset = true,
            _ => {}
        }
        true
    }
}

/// `rel` contains the `stylesheet` token.
pub fn is_stylesheet(node: &NodeView) -> bool {
    node.attr("rel")
        .is_some_and(|rel| rel.split_whitespace().any(|t| t.eq_ignore_ascii_case("stylesheet")))
}
