//! Scrape mapper. One instance per run: it owns the shared HTTP
//! session, the extractor registry, and the cascade under construction.
//! Every seed and every link delegated by the forum extractor funnels
//! through [`ScrapeMapper::map_url`].
//!
//! # Features
//! - Host dispatch to the matching extractor, with direct CDN links
//!   short-circuited past the HTML fetch
//! - Duplicate seeds dropped before any network traffic
//! - Unsupported hosts appended to a plain-text log for the user
//! - Forum login as a run-once future shared by every forum URL

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex as AsyncMutex, OnceCell};
use tracing::{debug, info, warn};
use url::Url;

use crate::cascade::{CascadeItem, DomainItem};
use crate::extract::{self, ExtractorSet, forum};
use crate::session::Session;
use crate::settings::ForumAuth;

pub struct ScrapeMapper {
    session: Session,
    extractors: ExtractorSet,
    cascade: Mutex<CascadeItem>,
    seen: Mutex<HashSet<String>>,
    forum_auth: Option<ForumAuth>,
    forum_login: OnceCell<bool>,
    unsupported_log: PathBuf,
    unsupported_guard: AsyncMutex<()>,
}

impl ScrapeMapper {
    #[must_use]
    pub fn new(
        session: Session,
        extractors: ExtractorSet,
        forum_auth: Option<ForumAuth>,
        unsupported_log: PathBuf,
    ) -> Self {
        Self {
            session,
            extractors,
            cascade: Mutex::new(CascadeItem::new()),
            seen: Mutex::new(HashSet::new()),
            forum_auth,
            forum_login: OnceCell::new(),
            unsupported_log,
            unsupported_guard: AsyncMutex::new(()),
        }
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Routes one URL to its extractor and merges the result into the
    /// cascade. `title_prefix` nests the resulting albums under a
    /// parent title, which is how forum threads brand delegated links.
    ///
    /// Never fails: unsupported hosts are logged, extractor trouble is
    /// already absorbed inside the extractors themselves.
    pub async fn map_url(&self, url: Url, title_prefix: Option<String>) {
        {
            let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
            if !seen.insert(url.as_str().to_string()) {
                debug!(%url, "url already mapped, skipping");
                return;
            }
        }
        let Some(host) = url.host_str().map(str::to_lowercase) else {
            warn!(%url, "url has no host");
            return;
        };

        let Some((extractor, base)) = self.extractors.dispatch(&host) else {
            self.log_unsupported(&url).await;
            return;
        };

        let item = if extract::is_direct_link(&host, base) {
            debug!(%url, "direct media link, no page fetch needed");
            let media = extract::rewrite_direct_link(&url, base);
            let mut item = DomainItem::new(base);
            item.add_to_album(
                &extract::loose_files_title(extractor.name()),
                media.clone(),
                media,
            );
            item
        } else {
            info!(%url, extractor = extractor.name(), "scraping");
            extractor.fetch(self, &url).await
        };

        let mut wrapped = CascadeItem::new();
        wrapped.add_albums(item);
        if let Some(prefix) = title_prefix.filter(|prefix| !prefix.is_empty()) {
            wrapped.append_title(&prefix);
        }
        let mut cascade = self.cascade.lock().unwrap_or_else(PoisonError::into_inner);
        cascade.extend(wrapped);
    }

    /// Logs into the forum once per run. Concurrent callers share the
    /// same login attempt and its outcome. Returns `true` when no
    /// credentials are configured, since there is nothing to do.
    pub async fn ensure_forum_login(&self, url: &Url) -> bool {
        let Some(auth) = &self.forum_auth else {
            return true;
        };
        *self
            .forum_login
            .get_or_init(|| async {
                let Some(host) = url.host_str() else {
                    return false;
                };
                let Ok(base) = Url::parse(&format!("{}://{host}", url.scheme())) else {
                    return false;
                };
                forum::login(&self.session, &base, auth).await
            })
            .await
    }

    /// Tears the mapper down into its cascade, deduplicated and ready
    /// for the downloaders.
    #[must_use]
    pub fn into_cascade(self) -> CascadeItem {
        let mut cascade = self
            .cascade
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        cascade.dedupe();
        cascade
    }

    async fn log_unsupported(&self, url: &Url) {
        warn!(%url, "unsupported host");
        let _guard = self.unsupported_guard.lock().await;
        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.unsupported_log)
                .await?;
            file.write_all(format!("{url}\n").as_bytes()).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = result {
            warn!(path = %self.unsupported_log.display(), error = %e, "could not record unsupported url");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn mapper_in(dir: &std::path::Path) -> ScrapeMapper {
        ScrapeMapper::new(
            Session::new().unwrap(),
            ExtractorSet::with_default_extractors(),
            None,
            dir.join("unsupported.txt"),
        )
    }

    #[tokio::test]
    async fn test_map_url_unsupported_host_logged() {
        let dir = tempfile::tempdir().unwrap();
        let mapper = mapper_in(dir.path());
        mapper.map_url(url("https://nowhere.test/thing"), None).await;

        let logged = std::fs::read_to_string(dir.path().join("unsupported.txt")).unwrap();
        assert_eq!(logged, "https://nowhere.test/thing\n");
        assert!(mapper.into_cascade().is_empty());
    }

    #[tokio::test]
    async fn test_map_url_direct_link_skips_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let mapper = mapper_in(dir.path());
        mapper.map_url(url("https://i.pixl.is/foo.jpg"), None).await;

        let cascade = mapper.into_cascade();
        let album = cascade.domains["pixl.is"].albums.get("ShareX Loose Files").unwrap();
        assert_eq!(album.link_pairs.len(), 1);
        assert_eq!(album.link_pairs[0].media.as_str(), "https://i.pixl.is/foo.jpg");
        assert_eq!(album.link_pairs[0].referrer, album.link_pairs[0].media);
    }

    #[tokio::test]
    async fn test_map_url_direct_link_with_title_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let mapper = mapper_in(dir.path());
        mapper
            .map_url(
                url("https://i.pixl.is/foo.jpg"),
                Some("My Thread".to_string()),
            )
            .await;

        let cascade = mapper.into_cascade();
        assert!(
            cascade.domains["pixl.is"]
                .albums
                .contains_key("My Thread/ShareX Loose Files")
        );
    }

    #[tokio::test]
    async fn test_map_url_rewrites_bunkr_video() {
        let dir = tempfile::tempdir().unwrap();
        let mapper = mapper_in(dir.path());
        mapper.map_url(url("https://cdn.bunkr.is/clip.mp4"), None).await;

        let cascade = mapper.into_cascade();
        let album = cascade.domains["bunkr.is"].albums.get("Bunkr Loose Files").unwrap();
        assert_eq!(
            album.link_pairs[0].media.as_str(),
            "https://media-files.bunkr.is/clip.mp4"
        );
    }

    #[tokio::test]
    async fn test_map_url_duplicate_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let mapper = mapper_in(dir.path());
        let seed = url("https://i.pixl.is/foo.jpg");
        mapper.map_url(seed.clone(), None).await;
        mapper.map_url(seed, None).await;

        let cascade = mapper.into_cascade();
        assert_eq!(cascade.total_links(), 1);
    }

    #[tokio::test]
    async fn test_into_cascade_dedupes_converging_links() {
        let dir = tempfile::tempdir().unwrap();
        let mapper = mapper_in(dir.path());
        mapper.map_url(url("https://cdn.bunkr.is/clip.mp4"), None).await;
        mapper
            .map_url(url("https://media-files.bunkr.is/clip.mp4"), None)
            .await;

        let cascade = mapper.into_cascade();
        assert_eq!(cascade.total_links(), 1);
    }

    #[tokio::test]
    async fn test_ensure_forum_login_is_single_flight() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/login"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<input type="hidden" name="_xfToken" value="t1">"#,
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/login/login"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let mapper = ScrapeMapper::new(
            Session::new().unwrap(),
            ExtractorSet::with_default_extractors(),
            Some(ForumAuth::new("user", "pass")),
            dir.path().join("unsupported.txt"),
        );

        let seed = url(&format!("{}/threads/x.1/", server.uri()));
        assert!(mapper.ensure_forum_login(&seed).await);
        assert!(mapper.ensure_forum_login(&seed).await);
    }
}
