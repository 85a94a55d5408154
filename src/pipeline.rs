//! Run driver: seeds in, files on disk out.
//!
//! One run is two phases. The scrape phase maps every seed through the
//! [`ScrapeMapper`] and collects the deduplicated cascade. The download
//! phase walks the cascade domain by domain and runs one [`Downloader`]
//! per album. The history store is opened before either phase and
//! closed on every exit path, so interrupted work is committed as far
//! as it got.

use std::sync::Arc;

use futures_util::future::join_all;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::download::{
    DownloadContext, Downloader, FileLocks, HostGate, RetryPolicy, SlidingWindow,
};
use crate::extract::ExtractorSet;
use crate::history::{History, HistoryError};
use crate::mapper::ScrapeMapper;
use crate::session::{Session, SessionError};
use crate::settings::Settings;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Totals across every album of a run.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunReport {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Maps every seed, then downloads the resulting cascade.
///
/// One bad seed, album, or file never takes the run down: failures are
/// logged, counted, and the rest proceeds.
pub async fn run(settings: &Settings, seeds: Vec<Url>) -> Result<RunReport, PipelineError> {
    run_with(settings, seeds, ExtractorSet::with_default_extractors()).await
}

/// [`run`] with a caller-supplied extractor registry.
pub async fn run_with(
    settings: &Settings,
    seeds: Vec<Url>,
    extractors: ExtractorSet,
) -> Result<RunReport, PipelineError> {
    let history = History::open(&settings.history_path, settings.ignore_history).await?;
    let result = run_phases(settings, seeds, extractors, history.clone()).await;
    history.close().await;
    result
}

async fn run_phases(
    settings: &Settings,
    seeds: Vec<Url>,
    extractors: ExtractorSet,
    history: History,
) -> Result<RunReport, PipelineError> {
    let session = Session::new()?;
    let mapper = ScrapeMapper::new(
        session,
        extractors,
        settings.forum_auth.clone(),
        settings.unsupported_log.clone(),
    );

    info!(seeds = seeds.len(), "mapping seed urls");
    join_all(seeds.into_iter().map(|seed| mapper.map_url(seed, None))).await;

    let client = mapper.session().client().clone();
    let cascade = mapper.into_cascade();
    if cascade.is_empty() {
        info!("no downloadable links found");
        return Ok(RunReport::default());
    }
    info!(
        domains = cascade.domains.len(),
        links = cascade.total_links(),
        "scrape complete"
    );

    let ctx = DownloadContext {
        client,
        history,
        locks: Arc::new(FileLocks::new()),
        gate: Arc::new(HostGate::new(settings.host_delays.clone())),
        window: settings
            .throttle
            .as_ref()
            .map(|window| Arc::new(SlidingWindow::new(window.max_calls, window.period))),
        policy: RetryPolicy::new(settings.attempts, settings.disable_attempt_limit),
        exclusions: settings.exclusions,
        output_root: settings.output_root.clone(),
        threads: settings.threads,
        show_progress: settings.show_progress,
    };

    let mut report = RunReport::default();
    for (domain, item) in cascade.domains {
        for album in item.albums.into_values() {
            if album.link_pairs.is_empty() {
                continue;
            }
            let files = album.link_pairs.len();
            match Downloader::for_album(ctx.clone(), &domain, album).run().await {
                Ok(counts) => {
                    report.downloaded += counts.downloaded();
                    report.skipped += counts.skipped();
                    report.failed += counts.failed();
                }
                Err(e) => {
                    error!(domain = %domain, error = %e, "album could not run");
                    report.failed += files;
                }
            }
        }
    }
    Ok(report)
}
