//! Error types for mparchive.
//!
//! Library crates use [`ArchiveError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::fmt;
use std::path::PathBuf;

/// Top-level error type for all mparchive operations.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport failure: timeout, refused connection, non-success HTTP status.
    #[error("network error: {0}")]
    Network(String),

    /// The platform answered with a non-zero application status.
    #[error("platform error {code} ({kind}): {message}")]
    Platform {
        kind: PlatformErrorKind,
        code: i64,
        message: String,
    },

    /// Expected structure absent from an HTML page or JSON payload.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// The search endpoint returned no account for the query.
    #[error("no account found for {query:?}")]
    NotFound { query: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid caller input (bad date range, empty target, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ArchiveError>;

impl ArchiveError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Build a platform error from the `base_resp` status pair.
    pub fn platform(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Platform {
            kind: PlatformErrorKind::classify(code, &message),
            code,
            message,
        }
    }

    /// Operator-facing hint for errors that have a known remedy.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Platform { kind, .. } => Some(kind.hint()),
            Self::NotFound { .. } => {
                Some("check the account name, or pass an article URL instead")
            }
            Self::Network(_) => Some("check the network connection and try again"),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// PlatformErrorKind
// ---------------------------------------------------------------------------

/// Known causes behind a non-zero `base_resp.ret`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformErrorKind {
    /// Session cookies or token are stale or incomplete.
    ExpiredCredential,
    /// The platform throttled this session.
    RateLimited,
    /// Parameters were rejected or the endpoint changed.
    MalformedRequest,
    /// Any other non-zero status.
    Unknown,
}

impl PlatformErrorKind {
    /// Map a platform status code (and its message) to a known cause.
    pub fn classify(code: i64, message: &str) -> Self {
        match code {
            200013 => Self::ExpiredCredential,
            200003 if message.to_lowercase().contains("invalid session") => {
                Self::ExpiredCredential
            }
            200003 => Self::RateLimited,
            -1 => Self::MalformedRequest,
            _ => Self::Unknown,
        }
    }

    /// Human-readable remedy shown in the progress stream.
    pub fn hint(self) -> &'static str {
        match self {
            Self::ExpiredCredential => {
                "session expired or incomplete: log in again and copy the full cookie string and token from the same session"
            }
            Self::RateLimited => "too many requests: wait a while before retrying",
            Self::MalformedRequest => "request rejected: parameters may be wrong or the endpoint changed",
            Self::Unknown => "check the token and cookies, or log in again",
        }
    }
}

impl fmt::Display for PlatformErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ExpiredCredential => "expired credential",
            Self::RateLimited => "rate limited",
            Self::MalformedRequest => "malformed request",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}
