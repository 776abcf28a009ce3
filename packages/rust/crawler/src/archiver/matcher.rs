//! Video node detection over a parser-independent element view.
//!
//! The same [`VideoMatchers`] run against `scraper` elements during the
//! pre-scan and against `lol_html` elements during the rewrite, so both passes
//! agree on which nodes are videos.

use std::borrow::Cow;
use std::collections::HashMap;

use scraper::ElementRef;

// ---------------------------------------------------------------------------
// NodeView
// ---------------------------------------------------------------------------

/// Tag name, class set, and attributes of one element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeView {
    /// Lower-cased tag name.
    pub tag: String,
    pub classes: Vec<String>,
    pub attrs: HashMap<String, String>,
}

impl NodeView {
    pub fn new<N, V>(tag: &str, attrs: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        let attrs: HashMap<String, String> = attrs
            .into_iter()
            .map(|(name, value)| (name.into().to_ascii_lowercase(), value.into()))
            .collect();
        let classes = attrs
            .get("class")
            .map(|c| c.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();
        Self {
            tag: tag.to_ascii_lowercase(),
            classes,
            attrs,
        }
    }

    pub fn from_scraper(el: ElementRef<'_>) -> Self {
        let value = el.value();
        Self::new(value.name(), value.attrs())
    }

    /// Attribute values are entity-decoded so they compare equal to what
    /// `scraper` reports for the same element.
    pub fn from_rewriter(el: &lol_html::html_content::Element<'_, '_>) -> Self {
        Self::new(
            &el.tag_name(),
            el.attributes()
                .iter()
                .map(|a| (a.name(), decode_entities(&a.value()).into_owned())),
        )
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.contains_key(name)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }
}

/// Decode character references in a raw attribute value.
///
/// Handles numeric references and the named ones that show up in URLs and
/// class lists. Unknown references are kept verbatim.
pub fn decode_entities(raw: &str) -> Cow<'_, str> {
    if !raw.contains('&') {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        let decoded = tail
            .find(';')
            .filter(|&end| end <= MAX_REFERENCE_LEN)
            .and_then(|end| decode_reference(&tail[1..end]).map(|c| (c, end)));
        match decoded {
            Some((c, end)) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// Longest `&...;` span worth trying to decode.
const MAX_REFERENCE_LEN: usize = 10;

fn decode_reference(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => digits.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

// ---------------------------------------------------------------------------
// Matchers
// ---------------------------------------------------------------------------

/// A predicate over one element.
pub trait NodeMatcher: Send + Sync {
    fn matches(&self, node: &NodeView) -> bool;
}

/// Matches elements by tag name.
pub struct TagMatcher(pub &'static str);

impl NodeMatcher for TagMatcher {
    fn matches(&self, node: &NodeView) -> bool {
        node.tag == self.0
    }
}

/// Matches elements carrying a class.
pub struct ClassMatcher(pub &'static str);

impl NodeMatcher for ClassMatcher {
    fn matches(&self, node: &NodeView) -> bool {
        node.has_class(self.0)
    }
}

/// Matches elements carrying an attribute, whatever its value.
pub struct AttrMatcher(pub &'static str);

impl NodeMatcher for AttrMatcher {
    fn matches(&self, node: &NodeView) -> bool {
        node.has_attr(self.0)
    }
}

/// Iframes that embed a video player.
pub struct VideoIframeMatcher {
    domains: Vec<String>,
}

impl VideoIframeMatcher {
    pub fn new(domains: Vec<String>) -> Self {
        Self { domains }
    }
}

impl NodeMatcher for VideoIframeMatcher {
    fn matches(&self, node: &NodeView) -> bool {
        if node.tag != "iframe" {
            return false;
        }
        if node.has_class("video_iframe") || node.has_attr("data-vid") || node.has_attr("data-mpvid") {
            return true;
        }
        let src = node
            .attr("data-src")
            .filter(|s| !s.is_empty())
            .or_else(|| node.attr("src"))
            .unwrap_or_default();
        !src.is_empty() && self.domains.iter().any(|d| src.contains(d.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Which placeholder a matched video gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoKind {
    /// Short-video channel cards.
    Channels,
    /// Native players and embedded iframes.
    Embedded,
}

const PLACEHOLDER_STYLE: &str = "padding: 20px; text-align: center; background-color: #f0f0f0; \
     color: #666; border: 1px dashed #999; margin: 10px 0; font-size: 14px;";

impl VideoKind {
    pub fn notice(self) -> &'static str {
        match self {
            Self::Channels => "[Channels video is not available offline]",
            Self::Embedded => "[Embedded video is not available offline]",
        }
    }

    /// Markup that replaces the matched node.
    pub fn placeholder_html(self) -> String {
        format!(
            r#"<div class="mparchive-video" style="{PLACEHOLDER_STYLE}">{}</div>"#,
            self.notice()
        )
    }
}

/// Ordered matcher set; the first matching rule decides the kind.
pub struct VideoMatchers {
    rules: Vec<(VideoKind, Box<dyn NodeMatcher>)>,
}

impl VideoMatchers {
    /// Built-in rules, with `domains` marking video iframes.
    pub fn new(domains: Vec<String>) -> Self {
        Self {
            rules: vec![
                rule(VideoKind::Channels, TagMatcher("mp-common-videosnap")),
                rule(VideoKind::Channels, ClassMatcher("js_wechannel_video_card")),
                rule(VideoKind::Channels, ClassMatcher("js_finder_card")),
                rule(VideoKind::Channels, AttrMatcher("data-finder-feed-id")),
                rule(VideoKind::Embedded, TagMatcher("mp-video")),
                rule(VideoKind::Embedded, TagMatcher("video")),
                rule(VideoKind::Embedded, VideoIframeMatcher::new(domains)),
            ],
        }
    }

    pub fn classify(&self, node: &NodeView) -> Option<VideoKind> {
        self.rules
            .iter()
            .find(|(_, matcher)| matcher.matches(node))
            .map(|(kind, _)| *kind)
    }
}

fn rule(kind: VideoKind, matcher: impl NodeMatcher + 'static) -> (VideoKind, Box<dyn NodeMatcher>) {
    (kind, Box::new(matcher))
}
