//! Account resolution: account name or article URL → [`AccountId`].

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use url::Url;

use mparchive_shared::{AccountId, ArchiveError, ArticleDescriptor, Result, Target};

use crate::api::{self, SearchResponse};
use crate::fetch::Fetcher;
use crate::page::ArticlePage;

/// Query-string key carrying the account id in article links.
const BIZ_PARAM: &str = "__biz";

/// Maps operator input to the platform's account identifier.
pub struct AccountResolver<'a> {
    fetcher: &'a Fetcher,
}

impl<'a> AccountResolver<'a> {
    pub fn new(fetcher: &'a Fetcher) -> Self {
        Self { fetcher }
    }

    /// Resolve a name through search, or a URL through its embedded id,
    /// inline scripts, or the displayed account name (in that order).
    #[instrument(skip_all, fields(target = %target))]
    pub async fn resolve(&self, target: &Target) -> Result<AccountId> {
        match target {
            Target::Name(name) => self.search(name).await,
            Target::Url(url) => self.resolve_url(url).await,
        }
    }

    /// Search an account by display name; the first hit wins.
    pub async fn search(&self, name: &str) -> Result<AccountId> {
        let credentials = &self.fetcher.session().credentials;
        debug!(
            key_cookies = ?credentials.present_key_cookies(),
            cookie_count = credentials.cookie_count(),
            "searching account"
        );

        let params = api::search_params(credentials.token(), name);
        let response: SearchResponse = self.fetcher.get_api(api::SEARCH_PATH, &params).await?;
        response.base_resp.check()?;

        let hit = response.list.into_iter().next().ok_or_else(|| ArchiveError::NotFound {
            query: name.to_string(),
        })?;
        let id = AccountId::new(hit.fakeid).ok_or_else(|| {
            ArchiveError::parse(format!("search hit for {name:?} has no fakeid"))
        })?;

        info!(nickname = %hit.nickname, account = %id, "account found");
        Ok(id)
    }

    async fn resolve_url(&self, url: &str) -> Result<AccountId> {
        if let Some(id) = biz_from_url(url)? {
            info!(account = %id, "account id taken from URL");
            return Ok(id);
        }

        warn!("URL carries no account id, inspecting the article page");
        let html = self.fetcher.get_page(url).await?;
        let page = ArticlePage::parse(&html);

        if let Some(id) = page.biz.and_then(AccountId::new) {
            info!(account = %id, "account id found in page scripts");
            return Ok(id);
        }

        let name = page.account_name.ok_or_else(|| {
            ArchiveError::parse(format!("no account id or account name found in {url}"))
        })?;
        info!(account_name = %name, "resolving account by displayed name");
        self.search(&name).await
    }
}

/// Pull `__biz` out of an article link's query string.
pub fn biz_from_url(url: &str) -> Result<Option<AccountId>> {
    let parsed = Url::parse(url)
        .map_err(|e| ArchiveError::validation(format!("invalid article URL {url:?}: {e}")))?;
    Ok(parsed
        .query_pairs()
        .find(|(key, _)| key == BIZ_PARAM)
        .and_then(|(_, value)| AccountId::new(value.into_owned())))
}

/// Build a descriptor for one article from its own page (single-article mode).
#[instrument(skip_all, fields(url = %url))]
pub async fn describe_article(fetcher: &Fetcher, url: &str) -> Result<ArticleDescriptor> {
    let html = fetcher.get_page(url).await?;
    let page = ArticlePage::parse(&html);
    let now = Utc::now().timestamp();
    let title = page.title.unwrap_or_else(|| format!("untitled_{now}"));

    info!(%title, "article identified");
    Ok(ArticleDescriptor {
        title,
        canonical_url: url.to_string(),
        publish_timestamp: now,
        excerpt: String::new(),
    })
}
