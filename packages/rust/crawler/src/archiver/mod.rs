//! Per-article archiving: fetch, localize images, rewrite, write.
//!
//! [`ContentArchiver::archive`] never fails: every error inside one article is
//! logged and recorded as a missing local path, so a batch keeps going.

mod assets;
mod matcher;
mod rewrite;
mod scan;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use mparchive_shared::{ArchiveError, ArchiveStats, ArchivedArticle, ArticleDescriptor, Result};

use crate::fetch::Fetcher;

pub use assets::{image_extension, image_file_name, local_reference};
pub use matcher::{
    AttrMatcher, ClassMatcher, NodeMatcher, NodeView, TagMatcher, VideoIframeMatcher, VideoKind, VideoMatchers,
    decode_entities,
};
pub use rewrite::{OVERRIDE_STYLE_ID, RewritePlan, rewrite};
pub use scan::{ImageRef, PageScan};

/// What one archive attempt did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    /// The HTML file for the article.
    pub path: PathBuf,
    pub stats: ArchiveStats,
}

/// Turns article descriptors into self-contained offline files.
pub struct ContentArchiver<'a> {
    fetcher: &'a Fetcher,
    matchers: VideoMatchers,
}

impl<'a> ContentArchiver<'a> {
    pub fn new(fetcher: &'a Fetcher) -> Self {
        let domains = fetcher.session().config.video_domains.clone();
        Self {
            fetcher,
            matchers: VideoMatchers::new(domains),
        }
    }

    /// Archive one article into `output_dir`, recording failure as a missing path.
    pub async fn archive(&self, descriptor: &ArticleDescriptor, output_dir: &Path) -> ArchivedArticle {
        match self.try_archive(descriptor, output_dir).await {
            Ok(report) => {
                ArchivedArticle::new(descriptor.clone(), output_dir, Some(report.path)).with_stats(report.stats)
            }
            Err(e) => {
                warn!(title = %descriptor.title, url = %descriptor.canonical_url, error = %e, "archive failed");
                ArchivedArticle::new(descriptor.clone(), output_dir, None)
            }
        }
    }

    /// Archive one article, surfacing the first error that stops it.
    ///
    /// Image and stylesheet failures are not errors; they are counted in the
    /// report and the page keeps the remote reference (images) or loses the
    /// link (stylesheets).
    #[instrument(skip_all, fields(title = %descriptor.title))]
    pub async fn try_archive(&self, descriptor: &ArticleDescriptor, output_dir: &Path) -> Result<ArchiveReport> {
        let path = descriptor.output_path(output_dir);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            info!(path = %path.display(), "already archived, skipping");
            return Ok(ArchiveReport {
                path,
                stats: ArchiveStats {
                    skipped: true,
                    ..ArchiveStats::default()
                },
            });
        }

        let html = self.fetcher.get_page(&descriptor.canonical_url).await?;
        let scan = PageScan::run(&html, &descriptor.canonical_url, &self.matchers);
        debug!(
            stylesheets = scan.stylesheets.len(),
            images = scan.images.len(),
            videos = scan.videos,
            "page scanned"
        );

        let mut stats = ArchiveStats {
            videos_replaced: scan.videos,
            ..ArchiveStats::default()
        };

        let inline_css = self.fetch_stylesheets(&scan.stylesheets, &mut stats).await;

        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|e| ArchiveError::io(output_dir, e))?;
        let images = self
            .localize_images(descriptor, output_dir, &scan.images, &mut stats)
            .await?;

        let plan = RewritePlan {
            matchers: &self.matchers,
            inline_css: &inline_css,
            images: &images,
            has_charset: scan.has_charset,
        };
        let rewritten = rewrite(&html, &plan)?;
        write_atomic(&path, rewritten.as_bytes()).await?;

        info!(
            path = %path.display(),
            images_saved = stats.images_saved,
            images_failed = stats.images_failed,
            stylesheets = stats.stylesheets_inlined,
            videos = stats.videos_replaced,
            "article archived"
        );
        Ok(ArchiveReport { path, stats })
    }

    async fn fetch_stylesheets(&self, hrefs: &[String], stats: &mut ArchiveStats) -> Vec<String> {
        let mut bodies = Vec::with_capacity(hrefs.len());
        for href in hrefs {
            match self.fetcher.get_stylesheet(href).await {
                Ok(css) => {
                    stats.stylesheets_inlined += 1;
                    bodies.push(css);
                }
                Err(e) => {
                    stats.stylesheets_dropped += 1;
                    warn!(href = %href, error = %e, "stylesheet dropped");
                }
            }
        }
        bodies
    }

    /// Download images into the asset folder; returns `data-src` → local reference.
    async fn localize_images(
        &self,
        descriptor: &ArticleDescriptor,
        output_dir: &Path,
        images: &[ImageRef],
        stats: &mut ArchiveStats,
    ) -> Result<HashMap<String, String>> {
        let mut local = HashMap::new();
        if images.is_empty() {
            return Ok(local);
        }

        let asset_dir = descriptor.asset_dir(output_dir);
        tokio::fs::create_dir_all(&asset_dir)
            .await
            .map_err(|e| ArchiveError::io(&asset_dir, e))?;

        let stem = descriptor.file_stem();
        let timestamp = Utc::now().timestamp();

        for image in images {
            if local.contains_key(&image.data_src) {
                continue;
            }
            let ext = image_extension(image.data_type.as_deref());
            let file_name = image_file_name(image.index, timestamp, ext);
            let target = asset_dir.join(&file_name);

            match self.save_image(image, &target).await {
                Ok(()) => {
                    stats.images_saved += 1;
                    local.insert(image.data_src.clone(), local_reference(&stem, &file_name));
                }
                Err(e) => {
                    stats.images_failed += 1;
                    warn!(index = image.index, url = %image.data_src, error = %e, "image kept remote");
                }
            }
        }
        Ok(local)
    }

    async fn save_image(&self, image: &ImageRef, target: &Path) -> Result<()> {
        let bytes = self.fetcher.get_asset(&image.url).await?;
        tokio::fs::write(target, &bytes)
            .await
            .map_err(|e| ArchiveError::io(target, e))
    }
}

/// Write to a hidden temp file beside `path`, then rename over it.
async fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{file_name}.tmp"));
    tokio::fs::write(&temp, content)
        .await
        .map_err(|e| ArchiveError::io(&temp, e))?;
    tokio::fs::rename(&temp, path)
        .await
        .map_err(|e| ArchiveError::io(path, e))
}
