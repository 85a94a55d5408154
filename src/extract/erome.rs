//! Erome albums. Media sits in `media-group` blocks; images lazy-load
//! through `data-src` and videos through `<source>` children.

use std::sync::LazyLock;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::cascade::DomainItem;
use crate::mapper::ScrapeMapper;
use crate::naming;

use super::{Extractor, dom, fetch_page, loose_files_title};

#[allow(clippy::expect_used)]
static MEDIA_IMAGES: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("div.media-group img").expect("image selector is valid"));

#[allow(clippy::expect_used)]
static MEDIA_VIDEOS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("div.media-group video source").expect("video selector is valid")
});

#[allow(clippy::expect_used)]
static ALBUM_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1").expect("title selector is valid"));

/// Erome album host.
pub struct EromeExtractor;

impl EromeExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for EromeExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Album title and media links from one album page.
///
/// Images prefer the lazy-load `data-src` over the placeholder `src`;
/// videos come from their `<source>` elements.
fn parse_album(html: &str, page_url: &Url) -> (Option<String>, Vec<Url>) {
    let document = Html::parse_document(html);

    let title =
        dom::first_text(&document, &ALBUM_TITLE).map(|title| naming::sanitize_title(&title));

    let mut links: Vec<Url> = document
        .select(&MEDIA_IMAGES)
        .filter_map(|img| img.value().attr("data-src").or_else(|| img.value().attr("src")))
        .filter_map(|src| dom::absolutize(page_url, src))
        .collect();
    links.extend(
        dom::attr_values(&document, &MEDIA_VIDEOS, "src")
            .iter()
            .filter_map(|src| dom::absolutize(page_url, src)),
    );

    (title, links)
}

#[async_trait]
impl Extractor for EromeExtractor {
    fn name(&self) -> &'static str {
        "Erome"
    }

    fn domains(&self) -> &'static [&'static str] {
        &["erome.com"]
    }

    async fn fetch(&self, mapper: &ScrapeMapper, url: &Url) -> DomainItem {
        let mut domain = DomainItem::new(self.base_domain(url));
        let Some(body) = fetch_page(mapper, url).await else {
            return domain;
        };

        let (title, links) = parse_album(&body, url);
        if links.is_empty() {
            debug!(%url, "album page held no media");
            return domain;
        }
        let title = title.unwrap_or_else(|| loose_files_title(self.name()));

        for media in links {
            domain.add_to_album(&title, media, url.clone());
        }
        domain
    }
}
