//! Platform access and per-article archiving.
//!
//! This crate provides:
//! - [`Fetcher`]: throttled HTTP bound to an immutable [`SessionContext`]
//! - [`AccountResolver`]: account name or article URL → account id
//! - [`ArticleLister`]: paginated listing under a count or date policy
//! - [`ContentArchiver`]: offline rewrite with localized images

pub mod api;
pub mod archiver;
pub mod fetch;
pub mod lister;
pub mod page;
pub mod resolver;
pub mod session;
pub mod throttle;

pub use archiver::{ArchiveReport, ContentArchiver, NodeMatcher, NodeView, VideoKind, VideoMatchers};
pub use fetch::{Fetcher, absolutize};
pub use lister::{ArticleLister, Checkpoint, ListOutcome, PageRequest, Pager, StopReason, Unchecked};
pub use page::ArticlePage;
pub use resolver::{AccountResolver, biz_from_url, describe_article};
pub use session::{Credentials, KEY_COOKIES, SessionContext};
pub use throttle::Throttle;
