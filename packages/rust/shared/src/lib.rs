//! Shared types, error model, and configuration for mparchive.
//!
//! This crate is the foundation depended on by all other mparchive crates.
//! It provides:
//! - [`ArchiveError`]: the unified error type
//! - Domain types ([`AccountId`], [`ArticleDescriptor`], [`ArchivedArticle`], [`SelectionPolicy`])
//! - Configuration ([`AppConfig`], [`ArchiveConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ArchiveConfig, CredentialsConfig, DefaultsConfig, PlatformConfig, ThrottleConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, validate_config,
};
pub use error::{ArchiveError, PlatformErrorKind, Result};
pub use types::{
    ASSET_DIR_SUFFIX, AccountId, ArchiveStats, ArchivedArticle, ArticleDescriptor, DateRange, JobId,
    SelectionPolicy, Target, UsageClass, sanitize_filename,
};
