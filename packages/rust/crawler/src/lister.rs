//! Paginated article listing under a count or date-range policy.
//!
//! Pagination decisions live in [`Pager`], which never touches the network;
//! [`ArticleLister`] only feeds it pages and honors the caller's checkpoint.

use std::collections::HashSet;
use std::future::Future;
use std::ops::ControlFlow;

use tracing::{debug, info, instrument, warn};

use mparchive_shared::{AccountId, ArchiveError, ArticleDescriptor, DateRange, Result, SelectionPolicy};

use crate::api::{self, ListResponse};
use crate::fetch::Fetcher;

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// Cooperative suspension point consulted before each network-bound step.
///
/// Resolves to `true` when work may continue and `false` once the job has
/// been cancelled. Implementations may wait (e.g. while paused) before
/// resolving.
pub trait Checkpoint: Send + Sync {
    fn proceed(&self) -> impl Future<Output = bool> + Send;
}

/// A checkpoint that never pauses or cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unchecked;

impl Checkpoint for Unchecked {
    async fn proceed(&self) -> bool {
        true
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Why listing stopped.
#[derive(Debug)]
pub enum StopReason {
    /// The requested number of articles was collected.
    Satisfied,
    /// The platform returned an empty or short page.
    Exhausted,
    /// A page fell entirely before the start of the date range.
    PastRange,
    /// The date scan reached its offset ceiling.
    ScanLimit,
    /// A page call failed; earlier pages are kept.
    Failed(ArchiveError),
    /// The checkpoint reported cancellation.
    Cancelled,
}

impl StopReason {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Articles collected by one listing run.
#[derive(Debug)]
pub struct ListOutcome {
    /// Newest first, deduplicated by canonical URL.
    pub articles: Vec<ArticleDescriptor>,
    pub stop: StopReason,
    /// Number of list calls that returned a page.
    pub pages: u32,
}

// ---------------------------------------------------------------------------
// Pager
// ---------------------------------------------------------------------------

/// Offset and size of the next list call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub begin: u32,
    pub count: u32,
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Count(usize),
    Range {
        start: i64,
        end: i64,
        scan_limit: u32,
    },
}

/// Pagination state for one listing run.
#[derive(Debug)]
pub struct Pager {
    bound: Bound,
    page_size: u32,
    offset: u32,
    pages: u32,
    found_older: bool,
    seen: HashSet<String>,
    articles: Vec<ArticleDescriptor>,
}

impl Pager {
    /// Collect the newest `n` articles.
    pub fn count(n: u32, page_size: u32) -> Self {
        Self::with_bound(Bound::Count(n as usize), page_size)
    }

    /// Collect articles inside `range`, scanning at most `scan_limit` entries.
    pub fn range(range: &DateRange, page_size: u32, scan_limit: u32) -> Self {
        let (start, end) = range.bounds();
        Self::with_bound(
            Bound::Range {
                start,
                end,
                scan_limit,
            },
            page_size,
        )
    }

    fn with_bound(bound: Bound, page_size: u32) -> Self {
        Self {
            bound,
            page_size: page_size.max(1),
            offset: 0,
            pages: 0,
            found_older: false,
            seen: HashSet::new(),
            articles: Vec::new(),
        }
    }

    /// The next page to request, or the reason no further page is needed.
    pub fn next_request(&self) -> ControlFlow<StopReason, PageRequest> {
        match self.bound {
            Bound::Count(n) => {
                let remaining = n.saturating_sub(self.articles.len());
                if remaining == 0 {
                    return ControlFlow::Break(StopReason::Satisfied);
                }
                let count = (self.page_size as usize).min(remaining) as u32;
                ControlFlow::Continue(PageRequest {
                    begin: self.offset,
                    count,
                })
            }
            Bound::Range { scan_limit, .. } => {
                if self.offset >= scan_limit {
                    return ControlFlow::Break(StopReason::ScanLimit);
                }
                ControlFlow::Continue(PageRequest {
                    begin: self.offset,
                    count: self.page_size,
                })
            }
        }
    }

    /// Fold one returned page into the state.
    pub fn absorb(&mut self, request: PageRequest, batch: Vec<ArticleDescriptor>) -> ControlFlow<StopReason> {
        self.pages += 1;
        if batch.is_empty() {
            return ControlFlow::Break(StopReason::Exhausted);
        }

        let received = batch.len();
        self.offset += received as u32;

        match self.bound {
            Bound::Count(n) => {
                for article in batch {
                    self.keep(article);
                }
                if self.articles.len() >= n {
                    self.articles.truncate(n);
                    return ControlFlow::Break(StopReason::Satisfied);
                }
            }
            Bound::Range { start, end, .. } => {
                let all_older = batch.iter().all(|a| a.publish_timestamp < start);
                for article in batch {
                    let ts = article.publish_timestamp;
                    if ts < start {
                        self.found_older = true;
                    } else if ts <= end {
                        self.keep(article);
                    }
                }
                if self.found_older && all_older {
                    return ControlFlow::Break(StopReason::PastRange);
                }
            }
        }

        if received < request.count as usize {
            return ControlFlow::Break(StopReason::Exhausted);
        }
        ControlFlow::Continue(())
    }

    fn keep(&mut self, article: ArticleDescriptor) {
        if self.seen.insert(article.canonical_url.clone()) {
            self.articles.push(article);
        } else {
            debug!(url = %article.canonical_url, "duplicate article dropped");
        }
    }

    pub fn finish(self, stop: StopReason) -> ListOutcome {
        ListOutcome {
            articles: self.articles,
            stop,
            pages: self.pages,
        }
    }
}

// ---------------------------------------------------------------------------
// ArticleLister
// ---------------------------------------------------------------------------

/// Drives a [`Pager`] against the list endpoint.
pub struct ArticleLister<'a> {
    fetcher: &'a Fetcher,
}

impl<'a> ArticleLister<'a> {
    pub fn new(fetcher: &'a Fetcher) -> Self {
        Self { fetcher }
    }

    /// List an account's articles under `policy`.
    ///
    /// Only invalid input is returned as `Err`; failures while paging end the
    /// run with [`StopReason::Failed`] and keep what was collected.
    #[instrument(skip_all, fields(account = %account, policy = %policy))]
    pub async fn list(
        &self,
        account: &AccountId,
        policy: &SelectionPolicy,
        checkpoint: &impl Checkpoint,
    ) -> Result<ListOutcome> {
        let config = &self.fetcher.session().config;
        let mut pager = match policy {
            SelectionPolicy::CountBound(n) => Pager::count(*n, config.page_size),
            SelectionPolicy::DateRange(range) => {
                if range.start > range.end {
                    return Err(ArchiveError::validation(format!(
                        "start date {} is after end date {}",
                        range.start, range.end
                    )));
                }
                Pager::range(range, config.page_size, config.date_scan_limit)
            }
            SelectionPolicy::Single => {
                return Err(ArchiveError::validation(
                    "single-article jobs have nothing to list",
                ));
            }
        };

        let stop = loop {
            let request = match pager.next_request() {
                ControlFlow::Continue(request) => request,
                ControlFlow::Break(stop) => break stop,
            };
            if !checkpoint.proceed().await {
                break StopReason::Cancelled;
            }

            let batch = match self.fetch_page(account, request).await {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(begin = request.begin, error = %e, "list page failed");
                    break StopReason::Failed(e);
                }
            };
            debug!(begin = request.begin, requested = request.count, received = batch.len(), "page received");

            if let ControlFlow::Break(stop) = pager.absorb(request, batch) {
                break stop;
            }
        };

        let outcome = pager.finish(stop);
        info!(
            articles = outcome.articles.len(),
            pages = outcome.pages,
            stop = ?outcome.stop,
            "listing finished"
        );
        Ok(outcome)
    }

    async fn fetch_page(&self, account: &AccountId, request: PageRequest) -> Result<Vec<ArticleDescriptor>> {
        let token = self.fetcher.session().credentials.token();
        let params = api::list_params(token, account.as_str(), request.begin, request.count);
        let response: ListResponse = self.fetcher.get_api(api::LIST_PATH, &params).await?;
        response.base_resp.check()?;
        Ok(response.app_msg_list.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Credentials, SessionContext};
    use crate::throttle::Throttle;
    use chrono::{Local, TimeZone};
    use mparchive_shared::ArchiveConfig;
    use std::sync::atomic::{AtomicU32, Ordering};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher(base: &str) -> Fetcher {
        let session = SessionContext::new(
            ArchiveConfig::for_base_url(base),
            Credentials::from_cookie_header("slave_sid=abc", "777"),
        );
        Fetcher::with_throttle(session, Throttle::disabled()).unwrap()
    }

    fn account() -> AccountId {
        AccountId::new("MzA1Njc4").unwrap()
    }

    fn local_ts(y: i32, m: u32, d: u32) -> i64 {
        Local.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap().timestamp()
    }

    fn msg(id: u32, ts: i64) -> serde_json::Value {
        serde_json::json!({
            "title": format!("Article {id}"),
            "link": format!("https://mp.weixin.qq.com/s/{id}"),
            "create_time": ts,
            "digest": "",
        })
    }

    fn page_body(msgs: Vec<serde_json::Value>) -> serde_json::Value {
        serde_json::json!({"base_resp": {"ret": 0, "err_msg": "ok"}, "app_msg_list": msgs})
    }

    async fn mount_page(server: &MockServer, begin: u32, body: serde_json::Value, calls: u64) {
        Mock::given(method("GET"))
            .and(path("/cgi-bin/appmsg"))
            .and(query_param("begin", begin.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(calls)
            .mount(server)
            .await;
    }

    /// Cancels after allowing `budget` steps.
    struct Budget(AtomicU32);

    impl Checkpoint for Budget {
        async fn proceed(&self) -> bool {
            self.0
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        }
    }

    // -- Pager ----------------------------------------------------------------

    fn descriptor(id: u32, ts: i64) -> ArticleDescriptor {
        ArticleDescriptor {
            title: format!("Article {id}"),
            canonical_url: format!("https://mp.weixin.qq.com/s/{id}"),
            publish_timestamp: ts,
            excerpt: String::new(),
        }
    }

    #[test]
    fn count_pager_shrinks_last_page() {
        let mut pager = Pager::count(7, 5);
        let first = match pager.next_request() {
            ControlFlow::Continue(r) => r,
            ControlFlow::Break(s) => panic!("unexpected stop {s:?}"),
        };
        assert_eq!(first, PageRequest { begin: 0, count: 5 });

        let batch = (0..5).map(|i| descriptor(i, 100 - i as i64)).collect();
        assert!(pager.absorb(first, batch).is_continue());
        match pager.next_request() {
            ControlFlow::Continue(r) => assert_eq!(r, PageRequest { begin: 5, count: 2 }),
            ControlFlow::Break(s) => panic!("unexpected stop {s:?}"),
        }
    }

    #[test]
    fn count_zero_needs_no_request() {
        let pager = Pager::count(0, 5);
        assert!(matches!(pager.next_request(), ControlFlow::Break(StopReason::Satisfied)));
    }

    #[test]
    fn duplicates_are_dropped_but_offset_advances() {
        let mut pager = Pager::count(10, 5);
        let request = PageRequest { begin: 0, count: 5 };
        let batch = vec![
            descriptor(1, 50),
            descriptor(1, 50),
            descriptor(2, 40),
            descriptor(3, 30),
            descriptor(4, 20),
        ];
        assert!(pager.absorb(request, batch).is_continue());
        match pager.next_request() {
            ControlFlow::Continue(r) => assert_eq!(r, PageRequest { begin: 5, count: 5 }),
            ControlFlow::Break(s) => panic!("unexpected stop {s:?}"),
        }
        let outcome = pager.finish(StopReason::Exhausted);
        assert_eq!(outcome.articles.len(), 4);
    }

    #[test]
    fn range_pager_stops_at_scan_limit() {
        let range = DateRange::parse("2025-01-01", "2025-01-31").unwrap();
        let mut pager = Pager::range(&range, 5, 10);
        let ts = local_ts(2025, 1, 15);
        for begin in [0, 5] {
            let request = PageRequest { begin, count: 5 };
            let batch = (0..5).map(|i| descriptor(begin + i, ts)).collect();
            assert!(pager.absorb(request, batch).is_continue());
        }
        assert!(matches!(pager.next_request(), ControlFlow::Break(StopReason::ScanLimit)));
    }

    // -- ArticleLister --------------------------------------------------------

    #[tokio::test]
    async fn count_bound_truncates_to_n_newest_first() {
        let server = MockServer::start().await;
        let msgs = (0..3).map(|i| msg(i, 1_736_000_000 - i as i64 * 3600)).collect();
        Mock::given(method("GET"))
            .and(path("/cgi-bin/appmsg"))
            .and(query_param("begin", "0"))
            .and(query_param("count", "3"))
            .and(query_param("action", "list_ex"))
            .and(query_param("fakeid", "MzA1Njc4"))
            .and(query_param("type", "9"))
            .respond_with(ResponseTemplate::new(200).set_body_json(page_body(msgs)))
            .expect(1)
            .mount(&server)
            .await;

        let f = fetcher(&server.uri());
        let outcome = ArticleLister::new(&f)
            .list(&account(), &SelectionPolicy::CountBound(3), &Unchecked)
            .await
            .unwrap();

        assert_eq!(outcome.articles.len(), 3);
        assert!(matches!(outcome.stop, StopReason::Satisfied));
        assert!(
            outcome
                .articles
                .windows(2)
                .all(|w| w[0].publish_timestamp >= w[1].publish_timestamp)
        );
    }

    #[tokio::test]
    async fn count_bound_zero_makes_no_calls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let f = fetcher(&server.uri());
        let outcome = ArticleLister::new(&f)
            .list(&account(), &SelectionPolicy::CountBound(0), &Unchecked)
            .await
            .unwrap();
        assert!(outcome.articles.is_empty());
        assert_eq!(outcome.pages, 0);
    }

    #[tokio::test]
    async fn short_page_ends_listing() {
        let server = MockServer::start().await;
        let first = (0..5).map(|i| msg(i, 1_000 - i as i64)).collect();
        let second = (5..7).map(|i| msg(i, 1_000 - i as i64)).collect();
        mount_page(&server, 0, page_body(first), 1).await;
        mount_page(&server, 5, page_body(second), 1).await;

        let f = fetcher(&server.uri());
        let outcome = ArticleLister::new(&f)
            .list(&account(), &SelectionPolicy::CountBound(20), &Unchecked)
            .await
            .unwrap();
        assert_eq!(outcome.articles.len(), 7);
        assert_eq!(outcome.pages, 2);
        assert!(matches!(outcome.stop, StopReason::Exhausted));
    }

    #[tokio::test]
    async fn platform_failure_keeps_earlier_pages() {
        let server = MockServer::start().await;
        let first = (0..5).map(|i| msg(i, 1_000 - i as i64)).collect();
        mount_page(&server, 0, page_body(first), 1).await;
        mount_page(
            &server,
            5,
            serde_json::json!({"base_resp": {"ret": 200013, "err_msg": "freq control"}}),
            1,
        )
        .await;

        let f = fetcher(&server.uri());
        let outcome = ArticleLister::new(&f)
            .list(&account(), &SelectionPolicy::CountBound(10), &Unchecked)
            .await
            .unwrap();
        assert_eq!(outcome.articles.len(), 5);
        assert!(outcome.stop.is_failure());
        match outcome.stop {
            StopReason::Failed(ArchiveError::Platform { code, .. }) => assert_eq!(code, 200013),
            other => panic!("expected platform failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn date_range_returns_only_january_and_stops_past_range() {
        let server = MockServer::start().await;
        let pages = [
            vec![(1, (2025, 2, 20)), (2, (2025, 2, 10)), (3, (2025, 2, 1)), (4, (2025, 1, 28)), (5, (2025, 1, 20))],
            vec![(6, (2025, 1, 15)), (7, (2025, 1, 10)), (8, (2025, 1, 2)), (9, (2024, 12, 30)), (10, (2024, 12, 20))],
            vec![(11, (2024, 12, 15)), (12, (2024, 12, 10)), (13, (2024, 12, 5)), (14, (2024, 12, 3)), (15, (2024, 12, 1))],
        ];
        for (i, page) in pages.into_iter().enumerate() {
            let msgs = page
                .into_iter()
                .map(|(id, (y, m, d))| msg(id, local_ts(y, m, d)))
                .collect();
            mount_page(&server, i as u32 * 5, page_body(msgs), 1).await;
        }
        mount_page(&server, 15, page_body(vec![]), 0).await;

        let range = DateRange::parse("2025-01-01", "2025-01-31").unwrap();
        let (start, end) = range.bounds();
        let f = fetcher(&server.uri());
        let outcome = ArticleLister::new(&f)
            .list(&account(), &SelectionPolicy::DateRange(range), &Unchecked)
            .await
            .unwrap();

        let titles: Vec<&str> = outcome.articles.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, ["Article 4", "Article 5", "Article 6", "Article 7", "Article 8"]);
        assert!(outcome.articles.iter().all(|a| (start..=end).contains(&a.publish_timestamp)));
        assert!(matches!(outcome.stop, StopReason::PastRange));
        assert_eq!(outcome.pages, 3);
    }

    #[tokio::test]
    async fn inverted_range_rejected_before_any_call() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let range = DateRange {
            start: chrono::NaiveDate::from_ymd_opt(2025, 2, 1).unwrap(),
            end: chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        };
        let f = fetcher(&server.uri());
        let err = ArticleLister::new(&f)
            .list(&account(), &SelectionPolicy::DateRange(range), &Unchecked)
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Validation { .. }));
    }

    #[tokio::test]
    async fn cancellation_is_checked_before_each_page() {
        let server = MockServer::start().await;
        let first = (0..5).map(|i| msg(i, 1_000 - i as i64)).collect();
        mount_page(&server, 0, page_body(first), 1).await;
        mount_page(&server, 5, page_body(vec![]), 0).await;

        let f = fetcher(&server.uri());
        let outcome = ArticleLister::new(&f)
            .list(&account(), &SelectionPolicy::CountBound(10), &Budget(AtomicU32::new(1)))
            .await
            .unwrap();
        assert_eq!(outcome.articles.len(), 5);
        assert!(matches!(outcome.stop, StopReason::Cancelled));
    }
}
