//! Chibisafe-style album hosts: Cyberdrop, and Bunkr as a variant whose
//! video links must be rewritten to the `media-files.` CDN host.

use std::sync::LazyLock;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::cascade::DomainItem;
use crate::mapper::ScrapeMapper;
use crate::naming;

use super::{Extractor, dom, fetch_page, loose_files_title, rewrite_direct_link};

#[allow(clippy::expect_used)]
static ALBUM_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1#title").expect("album title selector is valid"));

#[allow(clippy::expect_used)]
static FILE_LINKS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.image").expect("file link selector is valid"));

/// Album host running chibisafe markup.
pub struct ChibisafeExtractor {
    name: &'static str,
    domains: &'static [&'static str],
    rewrite_cdn: bool,
}

impl ChibisafeExtractor {
    #[must_use]
    pub fn cyberdrop() -> Self {
        Self {
            name: "Cyberdrop",
            domains: &[
                "cyberdrop.me",
                "cyberdrop.cc",
                "cyberdrop.to",
                "cyberdrop.nl",
            ],
            rewrite_cdn: false,
        }
    }

    #[must_use]
    pub fn bunkr() -> Self {
        Self {
            name: "Bunkr",
            domains: &["bunkr.is", "bunkr.to"],
            rewrite_cdn: true,
        }
    }
}

/// Album title (sanitized) and media links from one album page.
fn parse_album(html: &str, page_url: &Url) -> (Option<String>, Vec<Url>) {
    let document = Html::parse_document(html);
    let title = dom::first_text(&document, &ALBUM_TITLE).map(|title| naming::sanitize_title(&title));
    let links = dom::attr_values(&document, &FILE_LINKS, "href")
        .iter()
        .filter_map(|href| dom::absolutize(page_url, href))
        .collect();
    (title, links)
}

#[async_trait]
impl Extractor for ChibisafeExtractor {
    fn name(&self) -> &'static str {
        self.name
    }

    fn domains(&self) -> &'static [&'static str] {
        self.domains
    }

    async fn fetch(&self, mapper: &ScrapeMapper, url: &Url) -> DomainItem {
        let base = self.base_domain(url);
        let mut domain = DomainItem::new(base.clone());
        let Some(body) = fetch_page(mapper, url).await else {
            return domain;
        };

        let (title, links) = parse_album(&body, url);
        let title = title
            .or_else(|| naming::filename_from_url(url).map(|name| naming::sanitize_title(&name)))
            .unwrap_or_else(|| loose_files_title(self.name));
        if links.is_empty() {
            debug!(%url, "album page held no media links");
            return domain;
        }

        for media in links {
            let media = if self.rewrite_cdn {
                rewrite_direct_link(&media, &base)
            } else {
                media
            };
            domain.add_to_album(&title, media, url.clone());
        }
        domain
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const ALBUM_FIXTURE: &str = r#"<!DOCTYPE html>
<html>
<head><title>Cyberdrop.me - Album</title></head>
<body>
  <section id="main">
    <h1 id="title" title="Summer Trip 2021.">
      Summer Trip 2021.
    </h1>
    <div class="image-container column">
      <a class="image" href="https://fs-03.cyberdrop.me/IMG_0001-abc123.jpg" target="_blank">
        <img class="img-responsive" src="https://fs-03.cyberdrop.me/IMG_0001-abc123.jpg">
      </a>
    </div>
    <div class="image-container column">
      <a class="image" href="https://fs-03.cyberdrop.me/IMG_0002-def456.jpg" target="_blank">
        <img class="img-responsive" src="https://fs-03.cyberdrop.me/IMG_0002-def456.jpg">
      </a>
    </div>
    <div class="image-container column">
      <a class="image" href="/f/rel-ghi789.png" target="_blank">
        <img class="img-responsive" src="/f/rel-ghi789.png">
      </a>
    </div>
    <a class="other" href="https://cyberdrop.me/faq">FAQ</a>
  </section>
</body>
</html>"#;

    const BUNKR_FIXTURE: &str = r#"<html>
<body>
  <h1 id="title">Clips</h1>
  <a class="image" href="https://cdn.bunkr.is/intro-k3j2h1.mp4">intro</a>
  <a class="image" href="https://cdn.bunkr.is/cover-a9b8c7.jpg">cover</a>
</body>
</html>"#;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_parse_album_title_and_links() {
        let page = url("https://cyberdrop.me/a/xyz");
        let (title, links) = parse_album(ALBUM_FIXTURE, &page);

        // Trailing dot is swapped by title sanitization.
        assert_eq!(title.as_deref(), Some("Summer Trip 2021-"));
        let hrefs: Vec<&str> = links.iter().map(Url::as_str).collect();
        assert_eq!(
            hrefs,
            vec![
                "https://fs-03.cyberdrop.me/IMG_0001-abc123.jpg",
                "https://fs-03.cyberdrop.me/IMG_0002-def456.jpg",
                "https://cyberdrop.me/f/rel-ghi789.png",
            ]
        );
    }

    #[test]
    fn test_parse_album_without_title() {
        let page = url("https://cyberdrop.me/a/xyz");
        let (title, links) = parse_album("<html><body>nothing here</body></html>", &page);
        assert!(title.is_none());
        assert!(links.is_empty());
    }

    #[test]
    fn test_bunkr_links_rewrite_videos_only() {
        let page = url("https://bunkr.is/a/abc");
        let (_, links) = parse_album(BUNKR_FIXTURE, &page);
        let rewritten: Vec<String> = links
            .iter()
            .map(|link| rewrite_direct_link(link, "bunkr.is").to_string())
            .collect();
        assert_eq!(
            rewritten,
            vec![
                "https://media-files.bunkr.is/intro-k3j2h1.mp4",
                "https://cdn.bunkr.is/cover-a9b8c7.jpg",
            ]
        );
    }

    #[test]
    fn test_extractor_identities() {
        assert_eq!(ChibisafeExtractor::cyberdrop().name(), "Cyberdrop");
        assert!(
            ChibisafeExtractor::bunkr()
                .domains()
                .contains(&"bunkr.to")
        );
    }
}
