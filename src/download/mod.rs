//! Streaming download machinery.
//!
//! Everything below the extraction layer lives here: the per-album
//! [`Downloader`], failure classification and retry pacing, per-host
//! request gating, and the in-process filename locks.
//!
//! # Features
//!
//! - Streaming downloads with `.part` resume across runs
//! - History-backed skipping and filename collision handling
//! - Per-host minimum request gaps plus an optional global call window
//! - `Retry-After` aware retries with a fixed pause otherwise

mod downloader;
mod error;
mod locks;
mod rate_limit;
pub mod retry;

pub use downloader::{DownloadContext, DownloadCounts, Downloader, FileOutcome, STALL_TIMEOUT};
pub use error::DownloadError;
pub use locks::{FileLockGuard, FileLocks};
pub use rate_limit::{HostGate, SlidingWindow};
pub use retry::{DEFAULT_ATTEMPTS, FailureType, RetryPolicy, classify, retry_delay};
