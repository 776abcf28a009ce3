//! Outbound HTTP for the archive pipeline.
//!
//! Every request goes through [`Fetcher`], which applies the fixed browser-like
//! headers, the per-worker [`Throttle`], and uniform error mapping.

use reqwest::Client;
use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use mparchive_shared::{ArchiveError, Result};

use crate::session::SessionContext;
use crate::throttle::Throttle;

/// How many bytes of an unparseable body to keep in the error message.
const BODY_SNIPPET_LEN: usize = 200;

/// Which throttling rule applies to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RequestKind {
    /// Search/list endpoints and article pages.
    Platform,
    /// Images and stylesheets.
    Asset,
}

/// HTTP client bound to one session.
pub struct Fetcher {
    client: Client,
    session: SessionContext,
    throttle: Throttle,
}

impl Fetcher {
    /// Build a client with the session's fixed headers and throttle policy.
    pub fn new(session: SessionContext) -> Result<Self> {
        let throttle = Throttle::new(session.config.min_delay, session.config.max_delay);
        Self::with_throttle(session, throttle)
    }

    /// Build a client with an explicit throttle.
    pub fn with_throttle(session: SessionContext, throttle: Throttle) -> Result<Self> {
        let config = &session.config;
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("zh-CN,zh;q=0.9,en;q=0.8"),
        );
        let referer = HeaderValue::from_str(&config.base_url)
            .map_err(|e| ArchiveError::config(format!("invalid base URL header: {e}")))?;
        headers.insert(header::REFERER, referer);

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ArchiveError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            session,
            throttle,
        })
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Call a platform JSON endpoint with the session cookies attached.
    ///
    /// `params` are sent in the given order; the platform is sensitive to them.
    #[instrument(skip_all, fields(path = %path))]
    pub async fn get_api<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let url = self.session.endpoint(path);
        self.pace(RequestKind::Platform).await;

        let response = self
            .client
            .get(&url)
            .header(header::ACCEPT, "application/json, text/plain, */*")
            .header("X-Requested-With", "XMLHttpRequest")
            .header(header::COOKIE, self.session.credentials.cookie_header())
            .query(params)
            .send()
            .await
            .map_err(|e| network_error(&url, e))?;

        let body = read_text(&url, response).await?;
        serde_json::from_str(&body).map_err(|e| {
            let snippet: String = body.chars().take(BODY_SNIPPET_LEN).collect();
            ArchiveError::parse(format!("{path}: invalid JSON ({e}): {snippet}"))
        })
    }

    /// Fetch an article page as text.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn get_page(&self, url: &str) -> Result<String> {
        self.pace(RequestKind::Platform).await;
        debug!(url, "fetching article page");

        let response = self
            .client
            .get(url)
            .header(
                header::ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .send()
            .await
            .map_err(|e| network_error(url, e))?;

        read_text(url, response).await
    }

    /// Fetch a stylesheet body.
    pub async fn get_stylesheet(&self, url: &str) -> Result<String> {
        self.pace(RequestKind::Asset).await;

        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "text/css,*/*;q=0.1")
            .timeout(self.session.config.stylesheet_timeout)
            .send()
            .await
            .map_err(|e| network_error(url, e))?;

        read_text(url, response).await
    }

    /// Fetch raw bytes of an image.
    pub async fn get_asset(&self, url: &str) -> Result<Vec<u8>> {
        self.pace(RequestKind::Asset).await;

        let response = self
            .client
            .get(url)
            .timeout(self.session.config.asset_timeout)
            .send()
            .await
            .map_err(|e| network_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ArchiveError::Network(format!("{url}: HTTP {status}")));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ArchiveError::Network(format!("{url}: body read failed: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn pace(&self, kind: RequestKind) {
        if kind == RequestKind::Platform || self.session.config.throttle_assets {
            self.throttle.wait().await;
        }
    }
}

/// Resolve a reference found on the page at `page_url`.
///
/// Protocol-relative references (`//host/path`) get https. Relative ones are
/// joined onto `page_url`; if that fails the reference is returned unchanged.
pub fn absolutize(reference: &str, page_url: &str) -> String {
    if reference.starts_with("//") {
        return format!("https:{reference}");
    }
    if Url::parse(reference).is_ok() {
        return reference.to_string();
    }
    Url::parse(page_url)
        .and_then(|base| base.join(reference))
        .map(String::from)
        .unwrap_or_else(|_| reference.to_string())
}

fn network_error(url: &str, e: reqwest::Error) -> ArchiveError {
    if e.is_timeout() {
        ArchiveError::Network(format!("{url}: request timed out"))
    } else {
        ArchiveError::Network(format!("{url}: {e}"))
    }
}

async fn read_text(url: &str, response: reqwest::Response) -> Result<String> {
    let status = response.status();
    if !status.is_success() {
        return Err(ArchiveError::Network(format!("{url}: HTTP {status}")));
    }
    response
        .text()
        .await
        .map_err(|e| ArchiveError::Network(format!("{url}: body read failed: {e}")))
}
