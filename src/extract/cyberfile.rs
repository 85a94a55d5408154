//! Cyberfile file pages. The download link never sits in the page
//! itself: the page exposes a numeric file id via an inline
//! `showFileInformation(..)` handler, and an ajax endpoint answers with
//! an HTML fragment whose `openUrl('..')` handler holds the real link.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::cascade::DomainItem;
use crate::mapper::ScrapeMapper;

use super::{Extractor, fetch_page, loose_files_title};

#[allow(clippy::expect_used)]
static FILE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"showFileInformation\((\d+)\)").expect("file id regex is valid"));

#[allow(clippy::expect_used)]
static OPEN_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"openUrl\('([^']+)'\)").expect("open url regex is valid"));

#[derive(Debug, Deserialize)]
struct FileDetails {
    #[serde(default)]
    html: String,
}

/// Cyberfile host.
pub struct CyberfileExtractor;

impl CyberfileExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for CyberfileExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_file_id(html: &str) -> Option<&str> {
    FILE_ID
        .captures(html)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str())
}

fn parse_open_url(fragment: &str) -> Option<Url> {
    OPEN_URL
        .captures(fragment)
        .and_then(|captures| captures.get(1))
        .and_then(|link| Url::parse(link.as_str()).ok())
}

#[async_trait]
impl Extractor for CyberfileExtractor {
    fn name(&self) -> &'static str {
        "Cyberfile"
    }

    fn domains(&self) -> &'static [&'static str] {
        &["cyberfile.me"]
    }

    async fn fetch(&self, mapper: &ScrapeMapper, url: &Url) -> DomainItem {
        let mut domain = DomainItem::new(self.base_domain(url));
        let Some(body) = fetch_page(mapper, url).await else {
            return domain;
        };
        let Some(id) = parse_file_id(&body) else {
            debug!(%url, "page exposed no file id");
            return domain;
        };
        let Ok(endpoint) = url.join("/account/ajax/file_details") else {
            return domain;
        };
        let response = match mapper
            .session()
            .client()
            .post(endpoint)
            .form(&[("u", id)])
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(%url, error = %e, "file details request failed");
                return domain;
            }
        };
        let details: FileDetails = match response.json().await {
            Ok(details) => details,
            Err(e) => {
                warn!(%url, error = %e, "file details response was not valid JSON");
                return domain;
            }
        };
        let Some(media) = parse_open_url(&details.html) else {
            debug!(%url, "details fragment held no download link");
            return domain;
        };
        domain.add_to_album(&loose_files_title(self.name()), media, url.clone());
        domain
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::extract::ExtractorSet;
    use crate::session::Session;

    use super::*;

    fn mapper() -> ScrapeMapper {
        ScrapeMapper::new(
            Session::new().unwrap(),
            ExtractorSet::new(),
            None,
            std::env::temp_dir().join("cyberfile-test-unsupported.txt"),
        )
    }

    #[test]
    fn test_parse_file_id() {
        let html = r#"<a class="btn" onclick="showFileInformation(40213);">Download</a>"#;
        assert_eq!(parse_file_id(html), Some("40213"));
        assert_eq!(parse_file_id("<html></html>"), None);
    }

    #[test]
    fn test_parse_open_url() {
        let fragment =
            r#"<a onclick="openUrl('https://p1.cyberfile.me/qf3k/archive.rar');">Go</a>"#;
        assert_eq!(
            parse_open_url(fragment).unwrap().as_str(),
            "https://p1.cyberfile.me/qf3k/archive.rar"
        );
        assert!(parse_open_url("nothing here").is_none());
    }

    #[tokio::test]
    async fn test_fetch_resolves_link_through_ajax() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/9q8w7e"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<html><body><a onclick="showFileInformation(998);">DL</a></body></html>"#,
            ))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/account/ajax/file_details"))
            .and(body_string_contains("u=998"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "html": "<a onclick=\"openUrl('https://p1.cyberfile.me/qf3k/archive.rar');\">Go</a>"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let extractor = CyberfileExtractor::new();
        let mapper = mapper();
        let seed = Url::parse(&format!("{}/9q8w7e", server.uri())).unwrap();
        let domain = extractor.fetch(&mapper, &seed).await;

        let album = domain.albums.get("Cyberfile Loose Files").unwrap();
        assert_eq!(
            album.link_pairs[0].media.as_str(),
            "https://p1.cyberfile.me/qf3k/archive.rar"
        );
    }
}
