//! Human-readable progress for front ends.

use tokio::sync::mpsc;

use mparchive_shared::{ArchiveStats, ArchivedArticle};

use crate::job::{JobOutcome, JobReport};

/// Progress callback for reporting job status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Free-form status line (warnings, platform hints).
    fn message(&self, text: &str);
    /// Called once listing finishes.
    fn listed(&self, count: usize);
    /// Called before archiving article `current` of `total` (1-based).
    fn article_started(&self, current: usize, total: usize, title: &str);
    /// Called after the archive attempt for article `current`; `article.stats`
    /// holds the image and stylesheet counts, or the skip flag.
    fn article_finished(&self, current: usize, total: usize, article: &ArchivedArticle);
    /// Called when the job ends, whatever the outcome.
    fn done(&self, report: &JobReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn message(&self, _text: &str) {}
    fn listed(&self, _count: usize) {}
    fn article_started(&self, _current: usize, _total: usize, _title: &str) {}
    fn article_finished(&self, _current: usize, _total: usize, _article: &ArchivedArticle) {}
    fn done(&self, _report: &JobReport) {}
}

/// Owned form of each callback, for front ends that render on another task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Phase(String),
    Message(String),
    Listed(usize),
    ArticleStarted { current: usize, total: usize, title: String },
    ArticleFinished {
        current: usize,
        total: usize,
        archived: bool,
        stats: ArchiveStats,
    },
    Done { archived: usize, outcome: JobOutcome },
}

/// Forwards every callback into an unbounded channel.
///
/// Sends after the receiver is gone are ignored.
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

impl ProgressReporter for ChannelProgress {
    fn phase(&self, name: &str) {
        self.emit(ProgressEvent::Phase(name.to_string()));
    }

    fn message(&self, text: &str) {
        self.emit(ProgressEvent::Message(text.to_string()));
    }

    fn listed(&self, count: usize) {
        self.emit(ProgressEvent::Listed(count));
    }

    fn article_started(&self, current: usize, total: usize, title: &str) {
        self.emit(ProgressEvent::ArticleStarted {
            current,
            total,
            title: title.to_string(),
        });
    }

    fn article_finished(&self, current: usize, total: usize, article: &ArchivedArticle) {
        self.emit(ProgressEvent::ArticleFinished {
            current,
            total,
            archived: article.is_archived(),
            stats: article.stats,
        });
    }

    fn done(&self, report: &JobReport) {
        self.emit(ProgressEvent::Done {
            archived: report.archived_count(),
            outcome: report.outcome.clone(),
        });
    }
}
