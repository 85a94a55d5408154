//! ShareX/Chevereto-style image hosts (pixl.is, putme.ga, putmega.com,
//! jpg.church). Listing pages carry thumbnails; single-image pages only
//! expose the full file through `og:image`.

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
static LISTING_IMAGES: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a.image-container img").expect("listing image selector is valid")
});

#[allow(clippy::expect_used)]
static OG_IMAGE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[property="og:image"]"#).expect("og:image selector is valid")
});

#[allow(clippy::expect_used)]
static OG_TITLE: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"meta[property="og:title"]"#).expect("og:title selector is valid")
});

/// Image host running ShareX-style markup.
pub struct ShareXExtractor;

impl ShareXExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for ShareXExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Album title and full-size image links from a listing or image page.
///
/// Thumbnail infixes are stripped so the links point at the originals.
/// A page with no listing falls back to its `og:image`, yielding at most
/// one link and no title.
fn parse_page(html: &str, page_url: &Url) -> (Option<String>, Vec<Url>) {
    let document = Html::parse_document(html);

    let listed: Vec<Url> = dom::attr_values(&document, &LISTING_IMAGES, "src")
        .iter()
        .filter_map(|src| dom::absolutize(page_url, src))
        .collect();

    if listed.is_empty() {
        let single = dom::meta_content(&document, &OG_IMAGE)
            .and_then(|content| dom::absolutize(page_url, &content));
        return (None, single.into_iter().collect());
    }

    let title = dom::meta_content(&document, &OG_TITLE)
        .map(|title| naming::sanitize_title(&title))
        .filter(|title| !title.is_empty());
    (title, listed)
}

#[async_trait]
impl Extractor for ShareXExtractor {
    fn name(&self) -> &'static str {
        "ShareX"
    }

    fn domains(&self) -> &'static [&'static str] {
        &["pixl.is", "putme.ga", "putmega.com", "jpg.church"]
    }

    async fn fetch(&self, mapper: &ScrapeMapper, url: &Url) -> DomainItem {
        let base = self.base_domain(url);
        let mut domain = DomainItem::new(base.clone());
        let Some(body) = fetch_page(mapper, url).await else {
            return domain;
        };

        let (title, images) = parse_page(&body, url);
        if images.is_empty() {
            debug!(%url, "no images found on page");
            return domain;
        }
        let title = title.unwrap_or_else(|| loose_files_title(self.name()));

        for image in images {
            let full_size = rewrite_direct_link(&image, &base);
            domain.add_to_album(&title, full_size, url.clone());
        }
        domain
    }
}
