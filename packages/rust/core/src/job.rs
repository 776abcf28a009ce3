//! Job controller: resolve → list → archive under pause/cancel control.
//!
//! [`run`] never returns an error. Whatever happens, the caller gets a
//! [`JobReport`] holding every article attempted so far and the outcome.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use mparchive_crawler::{
    AccountResolver, ArticleLister, ContentArchiver, Fetcher, SessionContext, StopReason, describe_article,
};
use mparchive_shared::{ArchiveError, ArchivedArticle, ArticleDescriptor, JobId, Result, SelectionPolicy, Target};

use crate::collaborators::AuthorizationGate;
use crate::control::JobToken;
use crate::progress::ProgressReporter;

/// What to archive and where.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub target: Target,
    pub policy: SelectionPolicy,
    pub output_dir: PathBuf,
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => f.write_str("completed"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

/// Result of one job.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub job_id: JobId,
    /// One entry per attempted article, in archive order.
    pub articles: Vec<ArchivedArticle>,
    pub outcome: JobOutcome,
    pub elapsed: Duration,
}

impl JobReport {
    pub fn archived_count(&self) -> usize {
        self.articles.iter().filter(|a| a.is_archived()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.articles.len() - self.archived_count()
    }
}

/// Run a job after checking the authorization gate.
///
/// The gate is consumed only when the job completes with at least one
/// article attempted; cancelled, failed and empty jobs leave the allowance
/// untouched.
pub async fn run_authorized(
    gate: &dyn AuthorizationGate,
    request: &JobRequest,
    session: SessionContext,
    control: &JobToken,
    progress: &dyn ProgressReporter,
) -> JobReport {
    let class = request.policy.usage_class();
    if !gate.authorize(class) {
        warn!(%class, "job not authorized");
        let report = JobReport {
            job_id: JobId::new(),
            articles: Vec::new(),
            outcome: JobOutcome::Failed(format!("{class} usage is not authorized")),
            elapsed: Duration::ZERO,
        };
        progress.message(&format!("Not authorized for {class} usage"));
        progress.done(&report);
        return report;
    }

    let report = run(request, session, control, progress).await;
    if report.outcome != JobOutcome::Completed || report.articles.is_empty() {
        debug!(%class, outcome = %report.outcome, "usage not consumed");
        return report;
    }
    if !gate.consume(class) {
        warn!(%class, "authorization gate refused to record usage");
    }
    report
}

/// Run one job to completion, cancellation, or failure.
#[instrument(skip_all, fields(target = %request.target, policy = %request.policy))]
pub async fn run(
    request: &JobRequest,
    session: SessionContext,
    control: &JobToken,
    progress: &dyn ProgressReporter,
) -> JobReport {
    let start = Instant::now();
    let job_id = JobId::new();
    info!(%job_id, output_dir = %request.output_dir.display(), "job started");
    debug!(
        key_cookies = ?session.credentials.present_key_cookies(),
        cookie_count = session.credentials.cookie_count(),
        "session credentials"
    );

    let mut articles = Vec::new();
    let outcome = match execute(request, session, control, progress, &mut articles).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(%job_id, error = %e, "job failed");
            progress.message(&format!("Error: {e}"));
            if let Some(hint) = e.hint() {
                progress.message(hint);
            }
            JobOutcome::Failed(e.to_string())
        }
    };

    let report = JobReport {
        job_id,
        articles,
        outcome,
        elapsed: start.elapsed(),
    };
    info!(
        job_id = %report.job_id,
        outcome = %report.outcome,
        archived = report.archived_count(),
        failed = report.failed_count(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        "job finished"
    );
    progress.done(&report);
    report
}

async fn execute(
    request: &JobRequest,
    session: SessionContext,
    control: &JobToken,
    progress: &dyn ProgressReporter,
    articles: &mut Vec<ArchivedArticle>,
) -> Result<JobOutcome> {
    progress.phase("Preparing output directory");
    tokio::fs::create_dir_all(&request.output_dir)
        .await
        .map_err(|e| ArchiveError::io(&request.output_dir, e))?;
    let fetcher = Fetcher::new(session)?;

    let (descriptors, listing_failure) = match &request.policy {
        SelectionPolicy::Single => {
            let Target::Url(url) = &request.target else {
                return Err(ArchiveError::validation("single-article mode needs an article URL"));
            };
            if !control.checkpoint().await {
                return Ok(JobOutcome::Cancelled);
            }
            progress.phase("Reading article");
            (vec![describe_article(&fetcher, url).await?], None)
        }
        policy => {
            if !control.checkpoint().await {
                return Ok(JobOutcome::Cancelled);
            }
            progress.phase("Resolving account");
            let account = AccountResolver::new(&fetcher).resolve(&request.target).await?;
            progress.message(&format!("Account id: {account}"));

            progress.phase("Listing articles");
            let listing = ArticleLister::new(&fetcher).list(&account, policy, control).await?;
            progress.listed(listing.articles.len());

            let failure = match listing.stop {
                StopReason::Cancelled => return Ok(JobOutcome::Cancelled),
                StopReason::Failed(e) => {
                    progress.message(&format!("Listing stopped early: {e}"));
                    if let Some(hint) = e.hint() {
                        progress.message(hint);
                    }
                    Some(e.to_string())
                }
                _ => None,
            };
            (listing.articles, failure)
        }
    };

    if !archive_all(&fetcher, &descriptors, request, control, progress, articles).await {
        return Ok(JobOutcome::Cancelled);
    }

    Ok(match listing_failure {
        Some(reason) => JobOutcome::Failed(reason),
        None => JobOutcome::Completed,
    })
}

/// Archive each descriptor in order; `false` if cancelled part-way.
async fn archive_all(
    fetcher: &Fetcher,
    descriptors: &[ArticleDescriptor],
    request: &JobRequest,
    control: &JobToken,
    progress: &dyn ProgressReporter,
    articles: &mut Vec<ArchivedArticle>,
) -> bool {
    progress.phase("Archiving articles");
    let archiver = ContentArchiver::new(fetcher);
    let total = descriptors.len();

    for (i, descriptor) in descriptors.iter().enumerate() {
        if !control.checkpoint().await {
            info!(attempted = i, total, "archiving cancelled");
            return false;
        }
        progress.article_started(i + 1, total, &descriptor.title);
        let archived = archiver.archive(descriptor, &request.output_dir).await;
        progress.article_finished(i + 1, total, &archived);
        articles.push(archived);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::UsageQuota;
    use crate::control::{JobHandle, job_control};
    use crate::progress::{ChannelProgress, ProgressEvent, SilentProgress};
    use mparchive_crawler::Credentials;
    use mparchive_shared::{ArchiveConfig, UsageClass};
    use std::path::Path;
    use uuid::Uuid;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session(base: &str) -> SessionContext {
        SessionContext::new(
            ArchiveConfig::for_base_url(base),
            Credentials::from_cookie_header("slave_sid=abc; bizuin=1", "777"),
        )
    }

    fn output_dir(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("mparchive-job-{name}-{}", Uuid::now_v7()))
            .join("downloads")
    }

    fn cleanup(dir: &Path) {
        if let Some(parent) = dir.parent() {
            let _ = std::fs::remove_dir_all(parent);
        }
    }

    fn request(target: Target, policy: SelectionPolicy, output_dir: PathBuf) -> JobRequest {
        JobRequest {
            target,
            policy,
            output_dir,
        }
    }

    /// Search, one list page of three articles, and their pages.
    async fn mount_account(server: &MockServer, article_expectations: [u64; 3]) {
        let base = server.uri();
        Mock::given(method("GET"))
            .and(path("/cgi-bin/searchbiz"))
            .and(query_param("query", "AcmeNews"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "base_resp": {"ret": 0, "err_msg": "ok"},
                "list": [{"fakeid": "MzA1Njc4", "nickname": "AcmeNews"}]
            })))
            .mount(server)
            .await;

        Mock::given(method("GET"))
            .and(path("/cgi-bin/appmsg"))
            .and(query_param("fakeid", "MzA1Njc4"))
            .and(query_param("begin", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "base_resp": {"ret": 0, "err_msg": "ok"},
                "app_msg_list": [
                    {"title": "Article/Title", "link": format!("{base}/s/1"), "create_time": 1_736_300_000, "digest": ""},
                    {"title": "Second", "link": format!("{base}/s/2"), "create_time": 1_736_200_000, "digest": ""},
                    {"title": "Third", "link": format!("{base}/s/3"), "create_time": 1_736_100_000, "digest": ""}
                ]
            })))
            .mount(server)
            .await;

        for (i, expected) in article_expectations.into_iter().enumerate() {
            let body = if i == 0 {
                format!(r#"<html><head></head><body><img data-src="{base}/img/1" data-type="jpeg"></body></html>"#)
            } else {
                format!("<html><head></head><body><p>article {}</p></body></html>", i + 1)
            };
            Mock::given(method("GET"))
                .and(path(format!("/s/{}", i + 1)))
                .respond_with(ResponseTemplate::new(200).set_body_string(body))
                .expect(expected)
                .mount(server)
                .await;
        }

        Mock::given(method("GET"))
            .and(path("/img/1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xD8]))
            .mount(server)
            .await;
    }

    /// Cancels the job once `after` articles have finished.
    struct CancelAfter {
        handle: JobHandle,
        after: usize,
    }

    impl ProgressReporter for CancelAfter {
        fn phase(&self, _name: &str) {}
        fn message(&self, _text: &str) {}
        fn listed(&self, _count: usize) {}
        fn article_started(&self, _current: usize, _total: usize, _title: &str) {}
        fn article_finished(&self, current: usize, _total: usize, _article: &ArchivedArticle) {
            if current == self.after {
                self.handle.cancel();
            }
        }
        fn done(&self, _report: &JobReport) {}
    }

    #[tokio::test]
    async fn count_job_archives_newest_articles() {
        let server = MockServer::start().await;
        mount_account(&server, [1, 1, 1]).await;
        let out = output_dir("count");
        let (_handle, token) = job_control();

        let req = request(Target::Name("AcmeNews".into()), SelectionPolicy::CountBound(3), out.clone());
        let report = run(&req, session(&server.uri()), &token, &SilentProgress).await;

        assert_eq!(report.outcome, JobOutcome::Completed);
        assert_eq!(report.articles.len(), 3);
        assert_eq!(report.archived_count(), 3);
        assert_eq!(report.articles[0].local_path, Some(out.join("Article_Title.html")));

        let images: Vec<String> = std::fs::read_dir(out.join("Article_Title_files"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(images.len(), 1);
        assert!(images[0].starts_with("0_") && images[0].ends_with(".jpg"));

        cleanup(&out);
    }

    #[tokio::test]
    async fn cancel_mid_batch_keeps_attempted_articles_only() {
        let server = MockServer::start().await;
        mount_account(&server, [1, 0, 0]).await;
        let out = output_dir("cancel");
        let (handle, token) = job_control();
        let progress = CancelAfter { handle, after: 1 };

        let req = request(Target::Name("AcmeNews".into()), SelectionPolicy::CountBound(3), out.clone());
        let report = run(&req, session(&server.uri()), &token, &progress).await;

        assert_eq!(report.outcome, JobOutcome::Cancelled);
        assert_eq!(report.articles.len(), 1);
        assert!(out.join("Article_Title.html").exists());
        assert!(!out.join("Second.html").exists());
        assert!(!out.join("Third.html").exists());

        cleanup(&out);
    }

    #[tokio::test]
    async fn cancelled_before_start_makes_no_calls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let out = output_dir("precancel");
        let (handle, token) = job_control();
        handle.cancel();

        let req = request(Target::Name("AcmeNews".into()), SelectionPolicy::CountBound(3), out.clone());
        let report = run(&req, session(&server.uri()), &token, &SilentProgress).await;
        assert_eq!(report.outcome, JobOutcome::Cancelled);
        assert!(report.articles.is_empty());

        cleanup(&out);
    }

    #[tokio::test]
    async fn resolution_failure_is_reported_not_raised() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/searchbiz"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "base_resp": {"ret": 200013, "err_msg": "freq control"}
            })))
            .mount(&server)
            .await;
        let out = output_dir("fail");
        let (_handle, token) = job_control();
        let (progress, mut events) = ChannelProgress::new();

        let req = request(Target::Name("AcmeNews".into()), SelectionPolicy::CountBound(3), out.clone());
        let report = run(&req, session(&server.uri()), &token, &progress).await;

        assert!(matches!(report.outcome, JobOutcome::Failed(ref reason) if reason.contains("200013")));
        assert!(report.articles.is_empty());

        let mut saw_hint = false;
        let mut last = None;
        while let Ok(event) = events.try_recv() {
            if let ProgressEvent::Message(ref text) = event {
                saw_hint |= text.to_lowercase().contains("log in");
            }
            last = Some(event);
        }
        assert!(saw_hint);
        assert!(matches!(last, Some(ProgressEvent::Done { archived: 0, .. })));

        cleanup(&out);
    }

    #[tokio::test]
    async fn single_mode_archives_the_target_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/s/one"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><head><meta property="og:title" content="Only One"></head><body>x</body></html>"#,
            ))
            .expect(2)
            .mount(&server)
            .await;
        let out = output_dir("single");
        let (_handle, token) = job_control();

        let url = format!("{}/s/one", server.uri());
        let req = request(Target::Url(url), SelectionPolicy::Single, out.clone());
        let report = run(&req, session(&server.uri()), &token, &SilentProgress).await;

        assert_eq!(report.outcome, JobOutcome::Completed);
        assert_eq!(report.articles.len(), 1);
        assert!(out.join("Only One.html").exists());

        cleanup(&out);
    }

    #[tokio::test]
    async fn single_mode_rejects_account_names() {
        let out = output_dir("single-name");
        let (_handle, token) = job_control();
        let req = request(Target::Name("AcmeNews".into()), SelectionPolicy::Single, out.clone());
        let report = run(&req, session("http://127.0.0.1:9"), &token, &SilentProgress).await;
        assert!(matches!(report.outcome, JobOutcome::Failed(_)));
        cleanup(&out);
    }

    #[tokio::test]
    async fn gate_consumed_only_on_completion() {
        let server = MockServer::start().await;
        mount_account(&server, [1, 1, 1]).await;
        let quota = UsageQuota::new([(UsageClass::Batch, 2)]);

        let out = output_dir("gate");
        let (_handle, token) = job_control();
        let req = request(Target::Name("AcmeNews".into()), SelectionPolicy::CountBound(3), out.clone());
        let report = run_authorized(&quota, &req, session(&server.uri()), &token, &SilentProgress).await;
        assert_eq!(report.outcome, JobOutcome::Completed);
        assert_eq!(quota.remaining(UsageClass::Batch), 1);

        let (handle, token) = job_control();
        handle.cancel();
        let report = run_authorized(&quota, &req, session(&server.uri()), &token, &SilentProgress).await;
        assert_eq!(report.outcome, JobOutcome::Cancelled);
        assert_eq!(quota.remaining(UsageClass::Batch), 1);

        cleanup(&out);
    }

    #[tokio::test]
    async fn unauthorized_job_never_starts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        let quota = UsageQuota::new([(UsageClass::Batch, 5)]);
        let out = output_dir("unauthorized");
        let (_handle, token) = job_control();

        let req = request(
            Target::Url(format!("{}/s/one", server.uri())),
            SelectionPolicy::Single,
            out.clone(),
        );
        let report = run_authorized(&quota, &req, session(&server.uri()), &token, &SilentProgress).await;
        assert!(matches!(report.outcome, JobOutcome::Failed(_)));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn empty_listing_does_not_consume_the_gate() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/searchbiz"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "base_resp": {"ret": 0, "err_msg": "ok"},
                "list": [{"fakeid": "MzA1Njc4", "nickname": "Quiet"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/cgi-bin/appmsg"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "base_resp": {"ret": 0, "err_msg": "ok"},
                "app_msg_list": []
            })))
            .mount(&server)
            .await;
        let quota = UsageQuota::new([(UsageClass::Batch, 1)]);
        let out = output_dir("empty");
        let (_handle, token) = job_control();

        let req = request(Target::Name("Quiet".into()), SelectionPolicy::CountBound(3), out.clone());
        let first = run_authorized(&quota, &req, session(&server.uri()), &token, &SilentProgress).await;
        let second = run_authorized(&quota, &req, session(&server.uri()), &token, &SilentProgress).await;

        assert_eq!(first.outcome, JobOutcome::Completed);
        assert!(first.articles.is_empty());
        assert_eq!(quota.remaining(UsageClass::Batch), 1);
        assert_ne!(first.job_id, second.job_id);

        cleanup(&out);
    }

    #[tokio::test]
    async fn progress_reports_image_outcomes_and_skips() {
        let server = MockServer::start().await;
        mount_account(&server, [1, 1, 1]).await;
        let out = output_dir("stats");
        let req = request(Target::Name("AcmeNews".into()), SelectionPolicy::CountBound(3), out.clone());

        let finished = |mut events: tokio::sync::mpsc::UnboundedReceiver<ProgressEvent>| {
            let mut stats = Vec::new();
            while let Ok(event) = events.try_recv() {
                if let ProgressEvent::ArticleFinished { stats: s, .. } = event {
                    stats.push(s);
                }
            }
            stats
        };

        let (_handle, token) = job_control();
        let (progress, events) = ChannelProgress::new();
        run(&req, session(&server.uri()), &token, &progress).await;
        let first = finished(events);
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].images_saved, 1);
        assert!(first.iter().all(|s| !s.skipped));

        // Second pass over the same directory: every page is already on disk.
        let (progress, events) = ChannelProgress::new();
        let report = run(&req, session(&server.uri()), &token, &progress).await;
        let second = finished(events);
        assert_eq!(report.outcome, JobOutcome::Completed);
        assert_eq!(second.len(), 3);
        assert!(second.iter().all(|s| s.skipped && s.images_saved == 0));
        assert!(report.articles.iter().all(|a| a.stats.skipped));

        cleanup(&out);
    }
}
