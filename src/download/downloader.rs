//! Per-album download driver.
//!
//! One [`Downloader`] serves one album: it pushes every link pair through
//! an unordered completion stream bounded by a semaphore, runs the
//! history/naming/resume procedure per file, and reports outcome counts.
//! Per-file failures never abort the album; they are retried per policy
//! and finally counted as failed.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::header::{
    CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, RANGE, REFERER, RETRY_AFTER,
};
use reqwest::{Client, StatusCode};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::cascade::{AlbumItem, LinkPair};
use crate::history::History;
use crate::naming;
use crate::settings::Exclusions;

use super::error::DownloadError;
use super::locks::FileLocks;
use super::rate_limit::{HostGate, SlidingWindow};
use super::retry::{self, RetryPolicy};

/// Chunks must keep arriving within this window or the transfer counts
/// as stalled and the attempt fails as a timeout.
pub const STALL_TIMEOUT: Duration = Duration::from_secs(120);

/// Domains containing this marker get their download width capped; the
/// CDN behind them bans clients that fetch too wide.
const AGGRESSIVE_CDN_MARKER: &str = "bunkr";

/// Width cap applied to aggressive CDNs.
const AGGRESSIVE_CDN_WIDTH: usize = 3;

/// Collision probing gives up after this many numbered variants.
const MAX_NAME_VARIANTS: u32 = 1000;

/// Suffix for in-progress files. Left on disk across runs so a later
/// run can resume from the received prefix.
const PART_SUFFIX: &str = ".part";

/// How a single link pair ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    /// Fetched, finalized, and committed to history.
    Downloaded,
    /// History already marks this URL path complete.
    AlreadyCompleted,
    /// A matching file was found on disk and adopted as complete.
    AlreadyOnDisk,
    /// Media class excluded by configuration.
    Filtered,
    /// The host answered with an HTML page instead of media.
    DeadLink,
    /// No usable filename could be determined.
    Unnamed,
    /// Permanent failure, or all attempts exhausted.
    Failed,
}

/// Outcome counters for one album run.
///
/// Atomic so concurrent per-file tasks update them without locking.
#[derive(Debug, Default)]
pub struct DownloadCounts {
    downloaded: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

impl DownloadCounts {
    fn record(&self, outcome: FileOutcome) {
        let counter = match outcome {
            FileOutcome::Downloaded => &self.downloaded,
            FileOutcome::Failed => &self.failed,
            FileOutcome::AlreadyCompleted
            | FileOutcome::AlreadyOnDisk
            | FileOutcome::Filtered
            | FileOutcome::DeadLink
            | FileOutcome::Unnamed => &self.skipped,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    /// Files fetched to completion during this run.
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.downloaded.load(Ordering::SeqCst)
    }

    /// Files skipped: already complete, adopted from disk, filtered,
    /// dead links, or unnameable.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Files that failed permanently or exhausted their attempts.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }
}

/// Shared handles one run threads through every album downloader.
#[derive(Debug, Clone)]
pub struct DownloadContext {
    pub client: Client,
    pub history: History,
    pub locks: Arc<FileLocks>,
    pub gate: Arc<HostGate>,
    pub window: Option<Arc<SlidingWindow>>,
    pub policy: RetryPolicy,
    pub exclusions: Exclusions,
    pub output_root: PathBuf,
    /// Concurrent fetches per album.
    pub threads: usize,
    pub show_progress: bool,
}

/// Downloads one album's link pairs into its directory.
#[derive(Debug)]
pub struct Downloader {
    ctx: DownloadContext,
    domain: String,
    album: AlbumItem,
    album_dir: PathBuf,
    width: usize,
}

/// Result of picking the on-disk name for a URL path.
enum NameResolution {
    /// Download under this name.
    Fresh(String),
    /// A matching file already exists; history was updated.
    AdoptedOnDisk,
    /// Every numbered variant was taken.
    Exhausted,
}

impl Downloader {
    /// Builds a downloader for one album of `domain`.
    ///
    /// The concurrency width is the configured thread count, capped for
    /// CDNs known to punish wide fetching.
    #[must_use]
    pub fn for_album(ctx: DownloadContext, domain: &str, album: AlbumItem) -> Self {
        let width = if domain.contains(AGGRESSIVE_CDN_MARKER) {
            ctx.threads.min(AGGRESSIVE_CDN_WIDTH)
        } else {
            ctx.threads
        }
        .max(1);
        let album_dir = naming::album_path(&ctx.output_root, &album.title);
        Self {
            ctx,
            domain: domain.to_string(),
            album,
            album_dir,
            width,
        }
    }

    /// Downloads every link pair in the album.
    ///
    /// Files proceed through an unordered completion stream, at most
    /// `width` in flight. Only directory creation can fail the album as
    /// a whole; everything per-file lands in the returned counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the album directory cannot be created.
    #[instrument(skip(self), fields(domain = %self.domain, album = %self.album.title, files = self.album.link_pairs.len()))]
    pub async fn run(&self) -> Result<DownloadCounts, DownloadError> {
        tokio::fs::create_dir_all(&self.album_dir)
            .await
            .map_err(|e| DownloadError::io(self.album_dir.clone(), e))?;

        let progress = if self.ctx.show_progress {
            ProgressBar::new(self.album.link_pairs.len() as u64)
        } else {
            ProgressBar::hidden()
        };
        progress.set_style(
            ProgressStyle::with_template("{msg:32!} {bar:30} {pos}/{len}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        progress.set_message(self.album.title.clone());

        let counts = DownloadCounts::default();
        let semaphore = Semaphore::new(self.width);

        let mut tasks: FuturesUnordered<_> = self
            .album
            .link_pairs
            .iter()
            .map(|pair| self.fetch_one(pair, &semaphore, &progress, &counts))
            .collect();
        while tasks.next().await.is_some() {}
        drop(tasks);

        progress.finish_and_clear();
        info!(
            downloaded = counts.downloaded(),
            skipped = counts.skipped(),
            failed = counts.failed(),
            "album finished"
        );
        Ok(counts)
    }

    async fn fetch_one(
        &self,
        pair: &LinkPair,
        semaphore: &Semaphore,
        progress: &ProgressBar,
        counts: &DownloadCounts,
    ) {
        // The semaphore lives for the whole run; closure is unreachable.
        let Ok(_permit) = semaphore.acquire().await else {
            return;
        };
        let outcome = self.download_with_retry(pair).await;
        counts.record(outcome);
        progress.inc(1);
    }

    /// Runs the per-file procedure, retrying per policy.
    ///
    /// The delay between tries honors a 429 `Retry-After` hint when the
    /// server sent one, otherwise it is the fixed retry pause.
    async fn download_with_retry(&self, pair: &LinkPair) -> FileOutcome {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let error = match self.try_download(pair).await {
                Ok(outcome) => return outcome,
                Err(error) => error,
            };

            let failure = retry::classify(&error);
            if !failure.is_retryable() || !self.ctx.policy.allows_retry(attempt) {
                warn!(
                    media = %pair.media,
                    attempt,
                    error = %error,
                    "giving up on file"
                );
                return FileOutcome::Failed;
            }

            let delay = retry::retry_delay(&error);
            debug!(
                media = %pair.media,
                attempt,
                delay_ms = delay.as_millis(),
                error = %error,
                "retrying after failure"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// One download attempt for one link pair.
    ///
    /// The sequence:
    /// 1. Skip when history marks the URL path complete.
    /// 2. Determine the filename (URL segment, else `Content-Disposition`).
    /// 3. Skip excluded media classes.
    /// 4. Claim the filename against concurrent tasks.
    /// 5. Resolve collisions against disk and history.
    /// 6. Record the claim as incomplete in history.
    /// 7. Resume from an existing `.part` prefix.
    /// 8. Wait on the per-host gate and the global window.
    /// 9. GET with referrer, `Range` when resuming.
    /// 10. Treat text/html bodies as dead links.
    /// 11. Stream to `.part`, failing on stalls.
    /// 12. Rename into place and mark complete.
    async fn try_download(&self, pair: &LinkPair) -> Result<FileOutcome, DownloadError> {
        let url_path = pair.media.path().to_string();

        if self.ctx.history.check_completed(&url_path).await? {
            debug!(media = %pair.media, "already recorded as complete");
            return Ok(FileOutcome::AlreadyCompleted);
        }

        let Some(candidate) = self.determine_filename(pair).await? else {
            warn!(media = %pair.media, "no usable filename, skipping");
            return Ok(FileOutcome::Unnamed);
        };

        if let Some(kind) = naming::file_extension(&candidate).and_then(naming::classify_extension)
            && self.ctx.exclusions.excludes(kind)
        {
            debug!(media = %pair.media, file = %candidate, "excluded media class");
            return Ok(FileOutcome::Filtered);
        }

        // Held until this attempt returns; serializes same-named files
        // within the process.
        let _claim = self.ctx.locks.acquire(&candidate).await;

        let filename = match self.resolve_name(pair, &url_path, &candidate).await? {
            NameResolution::Fresh(name) => name,
            NameResolution::AdoptedOnDisk => return Ok(FileOutcome::AlreadyOnDisk),
            NameResolution::Exhausted => {
                warn!(media = %pair.media, file = %candidate, "no free filename variant");
                return Ok(FileOutcome::Unnamed);
            }
        };

        self.ctx
            .history
            .insert_if_absent(&url_path, &filename, false)
            .await?;

        let target = self.album_dir.join(&filename);
        let part = part_path(&target);
        let resume_from = tokio::fs::metadata(&part)
            .await
            .map(|meta| meta.len())
            .unwrap_or(0);

        if let Some(host) = pair.media.host_str() {
            self.ctx.gate.wait(host).await;
        }
        if let Some(window) = &self.ctx.window {
            window.acquire().await;
        }

        let mut request = self
            .ctx
            .client
            .get(pair.media.clone())
            .header(REFERER, pair.referrer.as_str());
        if resume_from > 0 {
            request = request.header(RANGE, format!("bytes={resume_from}-"));
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(pair.media.as_str())
            } else {
                DownloadError::network(pair.media.as_str(), e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .map(std::string::ToString::to_string);
            return Err(DownloadError::http_status(
                pair.media.as_str(),
                status.as_u16(),
                retry_after,
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("");
        if content_type.contains("text") || content_type.contains("html") {
            debug!(media = %pair.media, content_type, "host served a page instead of media");
            return Ok(FileOutcome::DeadLink);
        }

        let resuming = resume_from > 0 && status == StatusCode::PARTIAL_CONTENT;
        stream_to_part(response, &part, resuming, &pair.media).await?;

        if tokio::fs::metadata(&target).await.is_ok() {
            // Another run finished this name first; ours is redundant.
            if let Err(error) = tokio::fs::remove_file(&part).await {
                warn!(path = %part.display(), %error, "could not remove leftover part file");
            }
        } else {
            tokio::fs::rename(&part, &target)
                .await
                .map_err(|e| DownloadError::io(target.clone(), e))?;
        }

        self.ctx.history.upsert(&url_path, &filename, true).await?;
        info!(
            media = %pair.media,
            path = %target.display(),
            resumed = resuming,
            "download complete"
        );
        Ok(FileOutcome::Downloaded)
    }

    /// Names the file from its URL when the extension is recognizable,
    /// otherwise asks the server via `Content-Disposition`.
    ///
    /// `Ok(None)` means the file cannot be named and should be skipped.
    /// Transport failures propagate so the retry loop can decide.
    async fn determine_filename(&self, pair: &LinkPair) -> Result<Option<String>, DownloadError> {
        if let Some(segment) = naming::filename_from_url(&pair.media) {
            let sanitized = naming::sanitize_filename(&segment);
            if naming::file_extension(&sanitized)
                .and_then(naming::classify_extension)
                .is_some()
            {
                return Ok(Some(sanitized));
            }
        }

        let response = self
            .ctx
            .client
            .get(pair.media.clone())
            .header(REFERER, pair.referrer.as_str())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DownloadError::timeout(pair.media.as_str())
                } else {
                    DownloadError::network(pair.media.as_str(), e)
                }
            })?;

        Ok(response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(naming::parse_content_disposition)
            .map(|name| naming::sanitize_filename(&name))
            .filter(|name| !name.is_empty()))
    }

    /// Picks the on-disk name for this URL path.
    ///
    /// A name already stored in history wins, so an interrupted download
    /// resumes under the name it started with. Otherwise a same-named,
    /// same-sized file on disk is adopted as complete. Any other
    /// collision, on disk or claimed in history by another URL, probes
    /// `name (k).ext` variants for the first free one.
    async fn resolve_name(
        &self,
        pair: &LinkPair,
        url_path: &str,
        candidate: &str,
    ) -> Result<NameResolution, DownloadError> {
        if let Some(stored) = self.ctx.history.get_filename(url_path).await? {
            return Ok(NameResolution::Fresh(stored));
        }

        let on_disk = tokio::fs::metadata(self.album_dir.join(candidate))
            .await
            .ok()
            .map(|meta| meta.len());
        if let Some(size) = on_disk
            && self.probe_content_length(pair).await == Some(size)
        {
            self.ctx.history.upsert(url_path, candidate, true).await?;
            info!(media = %pair.media, file = %candidate, "matching file already on disk");
            return Ok(NameResolution::AdoptedOnDisk);
        }

        if on_disk.is_none() && !self.ctx.history.check_filename(candidate).await? {
            return Ok(NameResolution::Fresh(candidate.to_string()));
        }

        for k in 1..=MAX_NAME_VARIANTS {
            let variant = naming::numbered_variant(candidate, k);
            let free_on_disk = tokio::fs::metadata(self.album_dir.join(&variant))
                .await
                .is_err();
            if free_on_disk && !self.ctx.history.check_filename(&variant).await? {
                return Ok(NameResolution::Fresh(variant));
            }
        }
        Ok(NameResolution::Exhausted)
    }

    /// HEAD probe for the remote size. The referrer rides along since
    /// CDNs refuse bare requests.
    async fn probe_content_length(&self, pair: &LinkPair) -> Option<u64> {
        let response = self
            .ctx
            .client
            .head(pair.media.clone())
            .header(REFERER, pair.referrer.as_str())
            .send()
            .await
            .ok()?;
        if !response.status().is_success() {
            return None;
        }
        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok())
    }
}

/// `<target>.part`, the in-progress sibling of the final path.
fn part_path(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(PART_SUFFIX);
    PathBuf::from(name)
}

/// Streams the response body into the part file.
///
/// Appends when resuming, truncates otherwise. Every chunk must arrive
/// within [`STALL_TIMEOUT`]; a stalled stream fails the attempt as a
/// timeout. The part file stays on disk after a failure so the next
/// attempt can resume.
async fn stream_to_part(
    response: reqwest::Response,
    part: &Path,
    resuming: bool,
    media: &Url,
) -> Result<(), DownloadError> {
    let file = if resuming {
        tokio::fs::OpenOptions::new().append(true).open(part).await
    } else {
        tokio::fs::File::create(part).await
    }
    .map_err(|e| DownloadError::io(part.to_path_buf(), e))?;

    let mut writer = BufWriter::new(file);
    let mut stream = response.bytes_stream();

    loop {
        let next = tokio::time::timeout(STALL_TIMEOUT, stream.next())
            .await
            .map_err(|_| DownloadError::timeout(media.as_str()))?;
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk.map_err(|e| {
            if e.is_timeout() {
                DownloadError::timeout(media.as_str())
            } else {
                DownloadError::network(media.as_str(), e)
            }
        })?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| DownloadError::io(part.to_path_buf(), e))?;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(part.to_path_buf(), e))
}
