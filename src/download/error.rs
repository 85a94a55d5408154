//! Error types for the download module.
//!
//! Structured errors for everything the per-file download procedure can
//! hit, carrying enough context (URL, path) that a log line alone tells
//! you which file to look at.

use std::path::PathBuf;

use thiserror::Error;

use crate::history::HistoryError;

/// Errors that can occur while downloading one file.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection reset, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request or chunk stream stalled past the timeout.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
        /// The Retry-After header value, if present (for 429 responses).
        retry_after: Option<String>,
    },

    /// File system error during download (create file, write, rename).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The media URL is malformed (no host, bad scheme).
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// History store failure while claiming or completing a row.
    #[error(transparent)]
    History(#[from] HistoryError),
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error carrying any Retry-After header value.
    pub fn http_status(
        url: impl Into<String>,
        status: u16,
        retry_after: Option<String>,
    ) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
            retry_after,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Returns the HTTP status code, if this is a status error.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

// No `From<reqwest::Error>` or `From<std::io::Error>`: those variants
// require context (url, path) the source errors do not carry, so callers
// go through the constructor helpers instead.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display_names_url() {
        let error = DownloadError::timeout("https://cdn.example.com/clip.mp4");
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("https://cdn.example.com/clip.mp4"));
    }

    #[test]
    fn test_http_status_display() {
        let error = DownloadError::http_status("https://cdn.example.com/a.jpg", 404, None);
        let msg = error.to_string();
        assert!(msg.contains("404"), "expected '404' in: {msg}");
        assert!(
            msg.contains("https://cdn.example.com/a.jpg"),
            "expected URL in: {msg}"
        );
    }

    #[test]
    fn test_io_display_names_path() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = DownloadError::io(PathBuf::from("/out/a.jpg.part"), io_error);
        assert!(error.to_string().contains("/out/a.jpg.part"));
    }

    #[test]
    fn test_status_accessor() {
        let error = DownloadError::http_status("https://x.example/a", 429, Some("7".into()));
        assert_eq!(error.status(), Some(429));
        assert_eq!(DownloadError::timeout("https://x.example/a").status(), None);
    }
}
