//! Application configuration for mparchive.
//!
//! User config lives at `~/.mparchive/mparchive.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ArchiveError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "mparchive.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".mparchive";

// ---------------------------------------------------------------------------
// Config structs (matching mparchive.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Inter-request delay policy.
    #[serde(default)]
    pub throttle: ThrottleConfig,

    /// Remote platform endpoints and request settings.
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Where credentials are read from.
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default output directory for archived articles.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Descriptors requested per list call.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Upper bound on list offsets scanned by a date-range job.
    #[serde(default = "default_date_scan_limit")]
    pub date_scan_limit: u32,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            page_size: default_page_size(),
            date_scan_limit: default_date_scan_limit(),
        }
    }
}

fn default_output_dir() -> String {
    "downloads".into()
}
fn default_page_size() -> u32 {
    5
}
fn default_date_scan_limit() -> u32 {
    500
}

/// `[throttle]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    /// Lower bound of the randomized delay before each platform call.
    #[serde(default = "default_min_delay")]
    pub min_delay_ms: u64,

    /// Upper bound of the randomized delay before each platform call.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Also delay image and stylesheet downloads.
    #[serde(default)]
    pub throttle_assets: bool,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: default_min_delay(),
            max_delay_ms: default_max_delay(),
            throttle_assets: false,
        }
    }
}

fn default_min_delay() -> u64 {
    2000
}
fn default_max_delay() -> u64 {
    5000
}

/// `[platform]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// Origin of the publishing platform (search and list endpoints live here).
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Browser User-Agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Substrings of iframe sources that identify embedded video.
    #[serde(default = "default_video_domains")]
    pub video_domains: Vec<String>,

    /// Timeout for API calls and article pages.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for image downloads.
    #[serde(default = "default_asset_timeout")]
    pub asset_timeout_secs: u64,

    /// Timeout for stylesheet downloads.
    #[serde(default = "default_stylesheet_timeout")]
    pub stylesheet_timeout_secs: u64,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
            video_domains: default_video_domains(),
            request_timeout_secs: default_request_timeout(),
            asset_timeout_secs: default_asset_timeout(),
            stylesheet_timeout_secs: default_stylesheet_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "https://mp.weixin.qq.com".into()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".into()
}
fn default_video_domains() -> Vec<String> {
    [
        "v.qq.com",
        "mp.weixin.qq.com/mp/readtemplate?t=pages/video_player_tmpl",
        "weixin.qq.com/video",
        "finder.video.qq.com",
        "channels.weixin.qq.com",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_request_timeout() -> u64 {
    15
}
fn default_asset_timeout() -> u64 {
    10
}
fn default_stylesheet_timeout() -> u64 {
    5
}

/// `[credentials]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Name of the env var holding the browser cookie string (never store it here).
    #[serde(default = "default_cookie_env")]
    pub cookie_env: String,

    /// Name of the env var holding the session token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            cookie_env: default_cookie_env(),
            token_env: default_token_env(),
        }
    }
}

fn default_cookie_env() -> String {
    "MPARCHIVE_COOKIE".into()
}
fn default_token_env() -> String {
    "MPARCHIVE_TOKEN".into()
}

// ---------------------------------------------------------------------------
// Archive config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime archive configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Platform origin, e.g. `https://mp.weixin.qq.com`.
    pub base_url: String,
    /// User-Agent header value.
    pub user_agent: String,
    /// Iframe source substrings that mark embedded video.
    pub video_domains: Vec<String>,
    /// Descriptors requested per list call.
    pub page_size: u32,
    /// Offset ceiling for date-range scans.
    pub date_scan_limit: u32,
    /// Minimum randomized delay.
    pub min_delay: Duration,
    /// Maximum randomized delay.
    pub max_delay: Duration,
    /// Whether image/stylesheet downloads are delayed too.
    pub throttle_assets: bool,
    /// Timeout for API calls and article pages.
    pub request_timeout: Duration,
    /// Timeout for image downloads.
    pub asset_timeout: Duration,
    /// Timeout for stylesheet downloads.
    pub stylesheet_timeout: Duration,
}

impl From<&AppConfig> for ArchiveConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.platform.base_url.trim_end_matches('/').to_string(),
            user_agent: config.platform.user_agent.clone(),
            video_domains: config.platform.video_domains.clone(),
            page_size: config.defaults.page_size.max(1),
            date_scan_limit: config.defaults.date_scan_limit,
            min_delay: Duration::from_millis(config.throttle.min_delay_ms),
            max_delay: Duration::from_millis(config.throttle.max_delay_ms),
            throttle_assets: config.throttle.throttle_assets,
            request_timeout: Duration::from_secs(config.platform.request_timeout_secs),
            asset_timeout: Duration::from_secs(config.platform.asset_timeout_secs),
            stylesheet_timeout: Duration::from_secs(config.platform.stylesheet_timeout_secs),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl ArchiveConfig {
    /// Config for tests against a local mock server: no delays, short timeouts.
    pub fn for_base_url(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            request_timeout: Duration::from_secs(5),
            asset_timeout: Duration::from_secs(5),
            stylesheet_timeout: Duration::from_secs(5),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.mparchive/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ArchiveError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.mparchive/mparchive.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ArchiveError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        ArchiveError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ArchiveError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ArchiveError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ArchiveError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject settings the pipeline cannot run with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.throttle.min_delay_ms > config.throttle.max_delay_ms {
        return Err(ArchiveError::config(format!(
            "throttle.min_delay_ms ({}) exceeds throttle.max_delay_ms ({})",
            config.throttle.min_delay_ms, config.throttle.max_delay_ms
        )));
    }
    if url::Url::parse(&config.platform.base_url).is_err() {
        return Err(ArchiveError::config(format!(
            "platform.base_url is not a valid URL: {}",
            config.platform.base_url
        )));
    }
    Ok(())
}
