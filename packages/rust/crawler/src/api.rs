//! Wire format of the platform's search and list endpoints.
//!
//! Query parameters are reproduced exactly (names, values, and order) because
//! the remote side rejects anything else.

use serde::Deserialize;

use mparchive_shared::{ArchiveError, ArticleDescriptor, Result};

/// Account search endpoint.
pub const SEARCH_PATH: &str = "/cgi-bin/searchbiz";

/// Article list endpoint.
pub const LIST_PATH: &str = "/cgi-bin/appmsg";

/// Number of accounts requested from the search endpoint.
const SEARCH_RESULT_COUNT: u32 = 3;

/// Message type filter for rich-media articles.
const ARTICLE_TYPE: &str = "9";

/// Status block present in every JSON response.
#[derive(Debug, Clone, Deserialize)]
pub struct BaseResp {
    #[serde(default = "missing_ret")]
    pub ret: i64,
    #[serde(default)]
    pub err_msg: String,
}

fn missing_ret() -> i64 {
    -1
}

impl Default for BaseResp {
    fn default() -> Self {
        Self {
            ret: missing_ret(),
            err_msg: String::new(),
        }
    }
}

impl BaseResp {
    /// `Ok(())` on status 0, otherwise a classified platform error.
    pub fn check(&self) -> Result<()> {
        if self.ret == 0 {
            Ok(())
        } else {
            let message = if self.err_msg.is_empty() {
                "unknown error".to_string()
            } else {
                self.err_msg.clone()
            };
            Err(ArchiveError::platform(self.ret, message))
        }
    }
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub base_resp: BaseResp,
    #[serde(default)]
    pub list: Vec<AccountHit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountHit {
    #[serde(default)]
    pub fakeid: String,
    #[serde(default)]
    pub nickname: String,
}

/// `action=search_biz` query for `name`.
pub fn search_params(token: &str, query: &str) -> Vec<(&'static str, String)> {
    vec![
        ("action", "search_biz".to_string()),
        ("token", token.to_string()),
        ("lang", "zh_CN".to_string()),
        ("f", "json".to_string()),
        ("ajax", "1".to_string()),
        ("query", query.to_string()),
        ("begin", "0".to_string()),
        ("count", SEARCH_RESULT_COUNT.to_string()),
    ]
}

// ---------------------------------------------------------------------------
// List
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ListResponse {
    #[serde(default)]
    pub base_resp: BaseResp,
    #[serde(default)]
    pub app_msg_list: Vec<AppMsg>,
}

/// One entry of `app_msg_list`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppMsg {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub create_time: i64,
    #[serde(default)]
    pub digest: String,
}

impl From<AppMsg> for ArticleDescriptor {
    fn from(msg: AppMsg) -> Self {
        ArticleDescriptor {
            title: msg.title,
            canonical_url: msg.link,
            publish_timestamp: msg.create_time,
            excerpt: msg.digest,
        }
    }
}

/// `action=list_ex` query for one page of an account's articles.
pub fn list_params(token: &str, fakeid: &str, begin: u32, count: u32) -> Vec<(&'static str, String)> {
    vec![
        ("token", token.to_string()),
        ("lang", "zh_CN".to_string()),
        ("f", "json".to_string()),
        ("ajax", "1".to_string()),
        ("action", "list_ex".to_string()),
        ("begin", begin.to_string()),
        ("count", count.to_string()),
        ("query", String::new()),
        ("fakeid", fakeid.to_string()),
        ("type", ARTICLE_TYPE.to_string()),
    ]
}
