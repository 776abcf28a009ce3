//! Immutable session context: credentials plus runtime config.
//!
//! Built once per job and handed by reference to every component; nothing
//! mutates headers or cookies after construction.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use mparchive_shared::ArchiveConfig;

/// Cookies the platform needs for API calls; logged by name only.
pub const KEY_COOKIES: [&str; 5] = [
    "data_bizuin",
    "bizuin",
    "data_ticket",
    "slave_sid",
    "slave_user",
];

/// Cookie map and API token for one logged-in session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    cookies: BTreeMap<String, String>,
    token: String,
}

impl Credentials {
    pub fn new(cookies: BTreeMap<String, String>, token: impl Into<String>) -> Self {
        Self {
            cookies,
            token: token.into().trim().to_string(),
        }
    }

    /// Parse a browser cookie string (`a=b; c=d`). Pairs without `=` are skipped.
    pub fn from_cookie_header(header: &str, token: impl Into<String>) -> Self {
        let cookies = header
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.split_once('=')?;
                let name = name.trim();
                if name.is_empty() {
                    return None;
                }
                Some((name.to_string(), value.trim().to_string()))
            })
            .collect();
        Self::new(cookies, token)
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn cookie_count(&self) -> usize {
        self.cookies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty() || self.token.is_empty()
    }

    /// Which of [`KEY_COOKIES`] are present.
    pub fn present_key_cookies(&self) -> Vec<&'static str> {
        KEY_COOKIES
            .iter()
            .copied()
            .filter(|name| self.cookies.contains_key(*name))
            .collect()
    }

    /// Serialize as a `Cookie` header value.
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("cookies", &self.cookies.keys().collect::<Vec<_>>())
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Everything a request needs, shared read-only for the whole job.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub config: Arc<ArchiveConfig>,
    pub credentials: Arc<Credentials>,
}

impl SessionContext {
    pub fn new(config: ArchiveConfig, credentials: Credentials) -> Self {
        Self {
            config: Arc::new(config),
            credentials: Arc::new(credentials),
        }
    }

    /// `<base_url><path>` for a platform endpoint path such as `/cgi-bin/appmsg`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_browser_cookie_string() {
        let creds = Credentials::from_cookie_header(
            "slave_sid=abc==; bizuin=123 ;junk; =empty; data_ticket=x=y",
            " 9876 ",
        );
        assert_eq!(creds.cookie_count(), 3);
        assert_eq!(creds.token(), "9876");
        assert_eq!(creds.present_key_cookies(), vec!["bizuin", "data_ticket", "slave_sid"]);
        assert_eq!(
            creds.cookie_header(),
            "bizuin=123; data_ticket=x=y; slave_sid=abc=="
        );
    }

    #[test]
    fn debug_output_redacts_values() {
        let creds = Credentials::from_cookie_header("slave_sid=secret", "token-secret");
        let debug = format!("{creds:?}");
        assert!(debug.contains("slave_sid"));
        assert!(!debug.contains("secret\""));
        assert!(!debug.contains("token-secret"));
    }

    #[test]
    fn empty_credentials_detected() {
        assert!(Credentials::from_cookie_header("", "1").is_empty());
        assert!(Credentials::from_cookie_header("a=b", "").is_empty());
        assert!(!Credentials::from_cookie_header("a=b", "1").is_empty());
    }

    #[test]
    fn endpoint_joins_base_url() {
        let session = SessionContext::new(
            ArchiveConfig::for_base_url("http://127.0.0.1:8080/"),
            Credentials::from_cookie_header("a=b", "1"),
        );
        assert_eq!(
            session.endpoint("/cgi-bin/searchbiz"),
            "http://127.0.0.1:8080/cgi-bin/searchbiz"
        );
    }
}
