//! Failure classification and retry policy for downloads.
//!
//! The policy is deliberately simple: retryable failures wait a fixed
//! 2 s between attempts, rate limits additionally honor `Retry-After`,
//! and any other 4xx is permanent. The per-host throttle (not backoff)
//! is what keeps request pressure down.

use std::time::{Duration, SystemTime};

use tracing::instrument;

use super::DownloadError;

/// Fixed delay between retry attempts.
pub const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Upper bound honored for a server's Retry-After header.
/// Anything longer is treated as this value (1 hour).
const MAX_RETRY_AFTER: Duration = Duration::from_secs(3600);

/// Default number of attempts per file, including the first.
pub const DEFAULT_ATTEMPTS: u32 = 10;

/// Classification of download failure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    ///
    /// Examples: connection reset, truncated payload, stall timeout, 5xx.
    Transient,

    /// Failure that won't succeed regardless of retries.
    ///
    /// Examples: 404 Not Found, 403 Forbidden, malformed URL.
    Permanent,

    /// Server rate limiting (HTTP 429). Retryable after backoff.
    RateLimited,
}

impl FailureType {
    /// True for classifications the retry loop is allowed to retry.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::Permanent)
    }
}

/// Classifies a download error for the retry loop.
///
/// | Error | Type |
/// |-------|------|
/// | HTTP 429 | RateLimited |
/// | HTTP 4xx (other) | Permanent |
/// | HTTP 5xx and anything else | Transient |
/// | Timeout / Network | Transient |
/// | IO / History | Transient |
/// | InvalidUrl | Permanent |
///
/// IO and history failures are retried: both are usually momentary
/// (SQLITE_BUSY, a file briefly held by a scanner) and the attempt cap
/// bounds the damage when they are not.
#[instrument]
#[must_use]
pub fn classify(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status, .. } => classify_http_status(*status),
        DownloadError::Timeout { .. }
        | DownloadError::Network { .. }
        | DownloadError::Io { .. }
        | DownloadError::History(_) => FailureType::Transient,
        DownloadError::InvalidUrl { .. } => FailureType::Permanent,
    }
}

fn classify_http_status(status: u16) -> FailureType {
    match status {
        429 => FailureType::RateLimited,
        400..=499 => FailureType::Permanent,
        _ => FailureType::Transient,
    }
}

/// How long to sleep before the next attempt.
///
/// Rate-limited failures honor the server's Retry-After when it parses,
/// never sleeping less than the fixed delay and never more than an hour.
/// Everything else gets the fixed delay.
#[must_use]
pub fn retry_delay(error: &DownloadError) -> Duration {
    if let DownloadError::HttpStatus {
        status: 429,
        retry_after: Some(value),
        ..
    } = error
        && let Some(hinted) = parse_retry_after(value)
    {
        return hinted.max(RETRY_DELAY);
    }
    RETRY_DELAY
}

/// Parses a Retry-After header value: either delta-seconds or an
/// RFC 7231 HTTP-date. Returns `None` when neither form parses.
fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    let duration = if let Ok(seconds) = value.parse::<u64>() {
        Duration::from_secs(seconds)
    } else {
        let date = httpdate::parse_http_date(value).ok()?;
        date.duration_since(SystemTime::now()).unwrap_or_default()
    };
    Some(duration.min(MAX_RETRY_AFTER))
}

/// Attempt budget for one file.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    attempts: u32,
    unlimited: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            unlimited: false,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with `attempts` total tries (minimum 1), or no
    /// cap at all when `unlimited` is set.
    #[must_use]
    pub fn new(attempts: u32, unlimited: bool) -> Self {
        Self {
            attempts: attempts.max(1),
            unlimited,
        }
    }

    /// Whether another attempt is allowed after `attempt` failures.
    #[must_use]
    pub fn allows_retry(&self, attempt: u32) -> bool {
        self.unlimited || attempt < self.attempts
    }

    /// Total tries configured (meaningless when unlimited).
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
