//! Run configuration assembled by the CLI and consumed by the pipeline.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use crate::download::retry::DEFAULT_ATTEMPTS;
use crate::naming::MediaKind;

/// Default directory files are downloaded into.
pub const DEFAULT_OUTPUT_DIR: &str = "Downloads";

/// Default history database filename, relative to the working directory.
pub const DEFAULT_HISTORY_FILE: &str = "download_history.sqlite";

/// Filename of the unsupported-URL log, placed under the output root.
pub const UNSUPPORTED_LOG_FILE: &str = "Unsupported_URLs.txt";

/// Everything one run needs to know.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root of the on-disk album tree.
    pub output_root: PathBuf,
    /// Path of the SQLite history database.
    pub history_path: PathBuf,
    /// Treat every file as not-yet-downloaded while still recording.
    pub ignore_history: bool,
    /// Concurrent fetches per album.
    pub threads: usize,
    /// Total tries per file.
    pub attempts: u32,
    /// Retry retryable failures without an attempt cap.
    pub disable_attempt_limit: bool,
    /// Media classes the user refused.
    pub exclusions: Exclusions,
    /// Minimum request gap per host, keyed by lowercase host.
    pub host_delays: HashMap<String, Duration>,
    /// Optional global request budget.
    pub throttle: Option<ThrottleWindow>,
    /// Forum credentials, when thread scraping should log in.
    pub forum_auth: Option<ForumAuth>,
    /// Where URLs no extractor recognizes get appended.
    pub unsupported_log: PathBuf,
    /// Render per-album progress bars.
    pub show_progress: bool,
}

impl Default for Settings {
    fn default() -> Self {
        let output_root = PathBuf::from(DEFAULT_OUTPUT_DIR);
        Self {
            unsupported_log: output_root.join(UNSUPPORTED_LOG_FILE),
            output_root,
            history_path: PathBuf::from(DEFAULT_HISTORY_FILE),
            ignore_history: false,
            threads: default_threads(),
            attempts: DEFAULT_ATTEMPTS,
            disable_attempt_limit: false,
            exclusions: Exclusions::default(),
            host_delays: HashMap::new(),
            throttle: None,
            forum_auth: None,
            show_progress: true,
        }
    }
}

/// Per-album download width defaults to the host's parallelism.
fn default_threads() -> usize {
    std::thread::available_parallelism().map_or(4, NonZeroUsize::get)
}

/// Media classes the user asked to skip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Exclusions {
    pub images: bool,
    pub videos: bool,
    pub audio: bool,
    pub other: bool,
}

impl Exclusions {
    /// True iff files of `kind` should be skipped.
    #[must_use]
    pub fn excludes(&self, kind: MediaKind) -> bool {
        match kind {
            MediaKind::Image => self.images,
            MediaKind::Video => self.videos,
            MediaKind::Audio => self.audio,
            MediaKind::Other => self.other,
        }
    }
}

/// Global sliding-window request budget: `max_calls` per `period`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleWindow {
    pub max_calls: usize,
    pub period: Duration,
}

/// Forum login credentials.
///
/// `Debug` never prints the password; these flow through tracing spans.
#[derive(Clone)]
pub struct ForumAuth {
    username: String,
    password: String,
}

impl ForumAuth {
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for ForumAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForumAuth")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}
