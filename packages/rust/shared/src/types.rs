//! Core domain types for mparchive jobs.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ArchiveError, Result};

/// Suffix of the per-article folder holding localized images.
pub const ASSET_DIR_SUFFIX: &str = "_files";

// ---------------------------------------------------------------------------
// JobId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one archive job in logs (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    /// Generate a new time-sortable job identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// The platform's internal account identifier (`fakeid` / `__biz`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Wrap a raw identifier. Returns `None` for blank input.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Target & selection policy
// ---------------------------------------------------------------------------

/// What the operator typed: an account name or an article URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Human-readable account name, resolved through search.
    Name(String),
    /// Link to one article of the account.
    Url(String),
}

impl Target {
    /// Classify raw operator input.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ArchiveError::validation("target is empty"));
        }
        if raw.starts_with("http://") || raw.starts_with("https://") {
            Ok(Self::Url(raw.to_string()))
        } else {
            Ok(Self::Name(raw.to_string()))
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => write!(f, "account {name:?}"),
            Self::Url(url) => write!(f, "{url}"),
        }
    }
}

/// Inclusive calendar-date window, interpreted in local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Build a range, rejecting `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self> {
        if start > end {
            return Err(ArchiveError::validation(format!(
                "start date {start} is after end date {end}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parse two `YYYY-MM-DD` strings.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|e| {
                ArchiveError::validation(format!("invalid date {s:?} (expected YYYY-MM-DD): {e}"))
            })
        };
        Self::new(parse(start)?, parse(end)?)
    }

    /// Unix-second bounds: `start 00:00:00` through `end 23:59:59`, local time.
    pub fn bounds(&self) -> (i64, i64) {
        let first = NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default();
        let last = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default();
        (
            local_timestamp(self.start.and_time(first)),
            local_timestamp(self.end.and_time(last)),
        )
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

fn local_timestamp(dt: NaiveDateTime) -> i64 {
    Local
        .from_local_datetime(&dt)
        .earliest()
        .map(|t| t.timestamp())
        .unwrap_or_else(|| dt.and_utc().timestamp())
}

/// Which articles a job archives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// The newest `n` articles.
    CountBound(u32),
    /// Every article published inside the range.
    DateRange(DateRange),
    /// Only the article the target URL points at.
    Single,
}

impl SelectionPolicy {
    /// Usage class charged to the authorization gate.
    pub fn usage_class(&self) -> UsageClass {
        match self {
            Self::Single => UsageClass::Single,
            Self::CountBound(_) | Self::DateRange(_) => UsageClass::Batch,
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CountBound(n) => write!(f, "latest {n} articles"),
            Self::DateRange(range) => write!(f, "articles from {range}"),
            Self::Single => f.write_str("single article"),
        }
    }
}

/// Usage classes understood by the authorization gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageClass {
    Single,
    Batch,
}

impl fmt::Display for UsageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => f.write_str("single"),
            Self::Batch => f.write_str("batch"),
        }
    }
}

// ---------------------------------------------------------------------------
// ArticleDescriptor
// ---------------------------------------------------------------------------

/// One article as reported by the list endpoint. Never mutated after listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleDescriptor {
    /// Article title as published.
    pub title: String,
    /// Canonical article link; the dedupe key.
    pub canonical_url: String,
    /// Publish time in unix seconds.
    pub publish_timestamp: i64,
    /// Short summary shown in the list.
    #[serde(default)]
    pub excerpt: String,
}

impl ArticleDescriptor {
    /// Publish time as a local date-time, if the timestamp is representable.
    pub fn published_at(&self) -> Option<DateTime<Local>> {
        DateTime::<Utc>::from_timestamp(self.publish_timestamp, 0).map(|t| t.with_timezone(&Local))
    }

    /// Filesystem-safe stem shared by the HTML file and its asset folder.
    pub fn file_stem(&self) -> String {
        sanitize_filename(&self.title)
    }

    /// `<output_dir>/<stem>.html`
    pub fn output_path(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}.html", self.file_stem()))
    }

    /// `<output_dir>/<stem>_files`
    pub fn asset_dir(&self, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}{ASSET_DIR_SUFFIX}", self.file_stem()))
    }
}

/// Replace filesystem-illegal characters with `_` and trim surrounding space.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

// ---------------------------------------------------------------------------
// ArchivedArticle
// ---------------------------------------------------------------------------

/// Counters for one archive attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveStats {
    /// The file already existed and nothing was fetched.
    pub skipped: bool,
    pub images_saved: usize,
    /// Images left pointing at their remote URL.
    pub images_failed: usize,
    pub stylesheets_inlined: usize,
    pub stylesheets_dropped: usize,
    pub videos_replaced: usize,
}

/// Result of one archive attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchivedArticle {
    pub descriptor: ArticleDescriptor,
    /// Written HTML file; `None` when the attempt failed.
    pub local_path: Option<PathBuf>,
    /// Folder that holds (or would hold) the article's images.
    pub asset_dir: PathBuf,
    /// Zeroed when the attempt failed before anything was counted.
    #[serde(default)]
    pub stats: ArchiveStats,
}

impl ArchivedArticle {
    /// Record the outcome of the single archive attempt for `descriptor`.
    pub fn new(descriptor: ArticleDescriptor, output_dir: &Path, local_path: Option<PathBuf>) -> Self {
        let asset_dir = descriptor.asset_dir(output_dir);
        Self {
            descriptor,
            local_path,
            asset_dir,
            stats: ArchiveStats::default(),
        }
    }

    pub fn with_stats(mut self, stats: ArchiveStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn is_archived(&self) -> bool {
        self.local_path.is_some()
    }
}
