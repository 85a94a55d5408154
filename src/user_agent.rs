//! Shared User-Agent string for scrape and download HTTP traffic.
//!
//! The file hosts this tool talks to serve different markup (or refuse
//! service outright) to clients that do not look like a desktop browser,
//! so every request goes out under a single browser UA.

/// Desktop browser User-Agent presented on every request.
pub(crate) const DESKTOP_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";
