//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::warn;

use cascade_dl::download::DEFAULT_ATTEMPTS;
use cascade_dl::settings::{
    DEFAULT_HISTORY_FILE, DEFAULT_OUTPUT_DIR, Exclusions, ForumAuth, Settings, ThrottleWindow,
    UNSUPPORTED_LOG_FILE,
};

/// Scrape media albums from supported hosts and download them.
///
/// Takes album, file and forum-thread URLs, walks each one with the
/// matching site extractor, and downloads everything it finds into
/// per-album directories with resume and history support.
#[derive(Parser, Debug)]
#[command(name = "cascade-dl")]
#[command(author, version, about)]
pub struct Args {
    /// Album, file or forum thread URLs to scrape
    #[arg(value_name = "URL")]
    pub urls: Vec<String>,

    /// File with one URL per line (# comments and blank lines skipped)
    #[arg(short, long, value_name = "PATH")]
    pub input_file: Option<PathBuf>,

    /// Directory downloads are placed under
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: PathBuf,

    /// Concurrent downloads per album (1-100, default: CPU count)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub threads: Option<u8>,

    /// Maximum download attempts per file (1-50)
    #[arg(short, long, default_value_t = DEFAULT_ATTEMPTS as u8, value_parser = clap::value_parser!(u8).range(1..=50))]
    pub attempts: u8,

    /// Keep retrying transient failures with no attempt cap
    #[arg(long)]
    pub disable_attempt_limit: bool,

    /// SQLite file recording completed downloads
    #[arg(long, value_name = "PATH", default_value = DEFAULT_HISTORY_FILE)]
    pub history_file: PathBuf,

    /// Download files even when the history marks them completed
    #[arg(long)]
    pub ignore_history: bool,

    /// Skip image files
    #[arg(long)]
    pub exclude_images: bool,

    /// Skip video files
    #[arg(long)]
    pub exclude_videos: bool,

    /// Skip audio files
    #[arg(long)]
    pub exclude_audio: bool,

    /// Skip files that are neither image, video nor audio
    #[arg(long)]
    pub exclude_other: bool,

    /// Minimum gap between requests to a host, as HOST=SECONDS (repeatable)
    #[arg(long = "delay", value_name = "HOST=SECONDS", value_parser = parse_delay)]
    pub delays: Vec<(String, Duration)>,

    /// Cap on requests inside each throttle period
    #[arg(long, value_name = "N", requires = "throttle_period")]
    pub throttle_calls: Option<usize>,

    /// Length of the throttle window in seconds
    #[arg(long, value_name = "SECONDS", requires = "throttle_calls")]
    pub throttle_period: Option<u64>,

    /// Forum login name (or CASCADE_FORUM_USERNAME)
    #[arg(long, value_name = "NAME")]
    pub forum_username: Option<String>,

    /// Forum password (or CASCADE_FORUM_PASSWORD)
    #[arg(long, value_name = "PASSWORD")]
    pub forum_password: Option<String>,

    /// Where to record URLs no extractor handles
    #[arg(long, value_name = "PATH")]
    pub unsupported_log: Option<PathBuf>,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

fn parse_delay(raw: &str) -> Result<(String, Duration), String> {
    let (host, seconds) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected HOST=SECONDS, got '{raw}'"))?;
    let host = host.trim().to_lowercase();
    if host.is_empty() {
        return Err(format!("empty host in '{raw}'"));
    }
    let seconds: f64 = seconds
        .trim()
        .parse()
        .map_err(|_| format!("'{seconds}' is not a number of seconds"))?;
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(format!("'{seconds}' is not a usable delay"));
    }
    Ok((host, Duration::from_secs_f64(seconds)))
}

impl Args {
    /// Folds the parsed flags into run settings.
    #[must_use]
    pub fn to_settings(&self) -> Settings {
        let defaults = Settings::default();
        let throttle = match (self.throttle_calls, self.throttle_period) {
            (Some(max_calls), Some(period)) => Some(ThrottleWindow {
                max_calls,
                period: Duration::from_secs(period),
            }),
            _ => None,
        };

        let username = self
            .forum_username
            .clone()
            .or_else(|| std::env::var("CASCADE_FORUM_USERNAME").ok());
        let password = self
            .forum_password
            .clone()
            .or_else(|| std::env::var("CASCADE_FORUM_PASSWORD").ok());
        let forum_auth = match (username, password) {
            (Some(username), Some(password)) => Some(ForumAuth::new(username, password)),
            (Some(_), None) | (None, Some(_)) => {
                warn!("forum credentials need both a username and a password, ignoring");
                None
            }
            (None, None) => None,
        };

        Settings {
            output_root: self.output_dir.clone(),
            history_path: self.history_file.clone(),
            ignore_history: self.ignore_history,
            threads: self.threads.map_or(defaults.threads, usize::from),
            attempts: u32::from(self.attempts),
            disable_attempt_limit: self.disable_attempt_limit,
            exclusions: Exclusions {
                images: self.exclude_images,
                videos: self.exclude_videos,
                audio: self.exclude_audio,
                other: self.exclude_other,
            },
            host_delays: self.delays.iter().cloned().collect(),
            throttle,
            forum_auth,
            unsupported_log: self
                .unsupported_log
                .clone()
                .unwrap_or_else(|| self.output_dir.join(UNSUPPORTED_LOG_FILE)),
            show_progress: !self.quiet,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_args_parses_successfully() {
        let args = Args::try_parse_from(["cascade-dl"]).unwrap();
        assert!(args.urls.is_empty());
        assert_eq!(args.attempts, 10); // DEFAULT_ATTEMPTS
        assert_eq!(args.output_dir, PathBuf::from("Downloads"));
        assert!(!args.ignore_history);
    }

    #[test]
    fn test_cli_collects_positional_urls() {
        let args = Args::try_parse_from([
            "cascade-dl",
            "https://cyberdrop.me/a/x1",
            "https://bunkr.is/a/y2",
        ])
        .unwrap();
        assert_eq!(args.urls.len(), 2);
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from(["cascade-dl", "-vv"]).unwrap();
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn test_cli_delay_flag_parses_host_pairs() {
        let args = Args::try_parse_from([
            "cascade-dl",
            "--delay",
            "bunkr.is=1.5",
            "--delay",
            "Erome.com=2",
        ])
        .unwrap();
        assert_eq!(
            args.delays,
            vec![
                ("bunkr.is".to_string(), Duration::from_secs_f64(1.5)),
                ("erome.com".to_string(), Duration::from_secs(2)),
            ]
        );
    }

    #[test]
    fn test_cli_delay_flag_rejects_garbage() {
        assert!(Args::try_parse_from(["cascade-dl", "--delay", "bunkr.is"]).is_err());
        assert!(Args::try_parse_from(["cascade-dl", "--delay", "bunkr.is=fast"]).is_err());
        assert!(Args::try_parse_from(["cascade-dl", "--delay", "=2"]).is_err());
    }

    #[test]
    fn test_cli_throttle_flags_require_each_other() {
        assert!(Args::try_parse_from(["cascade-dl", "--throttle-calls", "5"]).is_err());
        assert!(Args::try_parse_from(["cascade-dl", "--throttle-period", "10"]).is_err());
        let args = Args::try_parse_from([
            "cascade-dl",
            "--throttle-calls",
            "5",
            "--throttle-period",
            "10",
        ])
        .unwrap();
        assert_eq!(args.throttle_calls, Some(5));
    }

    #[test]
    fn test_cli_threads_range_enforced() {
        assert!(Args::try_parse_from(["cascade-dl", "--threads", "0"]).is_err());
        assert!(Args::try_parse_from(["cascade-dl", "--threads", "101"]).is_err());
        let args = Args::try_parse_from(["cascade-dl", "--threads", "8"]).unwrap();
        assert_eq!(args.threads, Some(8));
    }

    #[test]
    fn test_to_settings_builds_throttle_and_exclusions() {
        let args = Args::try_parse_from([
            "cascade-dl",
            "--throttle-calls",
            "4",
            "--throttle-period",
            "2",
            "--exclude-videos",
            "--threads",
            "6",
        ])
        .unwrap();
        let settings = args.to_settings();
        let throttle = settings.throttle.unwrap();
        assert_eq!(throttle.max_calls, 4);
        assert_eq!(throttle.period, Duration::from_secs(2));
        assert!(settings.exclusions.videos);
        assert!(!settings.exclusions.images);
        assert_eq!(settings.threads, 6);
        assert_eq!(
            settings.unsupported_log,
            PathBuf::from("Downloads").join("Unsupported_URLs.txt")
        );
    }
}
