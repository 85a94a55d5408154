//! Album Downloader Library
//!
//! This library scrapes media albums from a fixed set of file hosts and
//! forum threads, then downloads every discovered file with per-album
//! concurrency, resume support and a persistent download history.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`cascade`] - The domain → album → link-pair work model
//! - [`extract`] - Site extractors and the host dispatch table
//! - [`mapper`] - Routes URLs to extractors and builds the cascade
//! - [`download`] - Streaming downloader with retry and rate limiting
//! - [`history`] - SQLite-backed record of completed downloads
//! - [`pipeline`] - One-shot driver tying scrape and download together
//! - [`naming`] - Title/filename sanitization and collision handling
//! - [`session`] - Shared HTTP client with cookies and a browser UA
//! - [`settings`] - Run configuration assembled by the CLI

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cascade;
pub mod download;
pub mod extract;
pub mod history;
pub mod mapper;
pub mod naming;
pub mod pipeline;
pub mod session;
pub mod settings;
mod user_agent;

// Re-export commonly used types
pub use cascade::{AlbumItem, CascadeItem, DomainItem, LinkPair};
pub use download::{
    DownloadContext, DownloadCounts, DownloadError, Downloader, FailureType, FileOutcome,
    RetryPolicy,
};
pub use extract::{Extractor, ExtractorSet};
pub use history::{History, HistoryError};
pub use mapper::ScrapeMapper;
pub use pipeline::{PipelineError, RunReport, run};
pub use session::{Session, SessionError};
pub use settings::{Exclusions, ForumAuth, Settings, ThrottleWindow};
