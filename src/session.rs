//! Shared HTTP session for scraping and downloading.
//!
//! One `reqwest::Client` and one cookie jar serve the whole run. Cookies
//! set during scraping (album passwords, forum login, GoFile account
//! tokens) are then presented on every CDN fetch, which several hosts
//! require before they will serve media.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::cookie::Jar;
use thiserror::Error;
use url::Url;

use crate::user_agent::DESKTOP_USER_AGENT;

/// Connection timeout for all requests, in seconds.
const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Session construction errors.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Failed to assemble the TLS/cookie configuration.
    #[error("failed to build HTTP client: {0}")]
    Build(#[from] reqwest::Error),
}

/// Shared HTTP state for one run.
///
/// No overall request timeout is set: media downloads legitimately run
/// for a long time, and stalls are caught per-chunk by the downloader.
#[derive(Debug, Clone)]
pub struct Session {
    client: Client,
    jar: Arc<Jar>,
}

impl Session {
    /// Builds the session with a browser User-Agent and a fresh cookie jar.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Build` if the client cannot be constructed.
    pub fn new() -> Result<Self, SessionError> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .user_agent(DESKTOP_USER_AGENT)
            .cookie_provider(Arc::clone(&jar))
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .gzip(true)
            .build()?;
        Ok(Self { client, jar })
    }

    /// Returns the shared client.
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Plants a cookie for `url`'s origin.
    ///
    /// Used by extractors that obtain tokens out of band (GoFile account
    /// tokens) or unlock password-protected albums.
    pub fn add_cookie(&self, url: &Url, cookie: &str) {
        self.jar.add_cookie_str(cookie, url);
    }
}
