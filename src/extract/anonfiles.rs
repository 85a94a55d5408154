//! Anonfiles file pages. One page, one download anchor.

use std::sync::LazyLock;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::cascade::DomainItem;
use crate::mapper::ScrapeMapper;

use super::{Extractor, dom, fetch_page, loose_files_title};

#[allow(clippy::expect_used)]
static DOWNLOAD_ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a#download-url").expect("download selector is valid"));

/// Anonfiles host.
pub struct AnonfilesExtractor;

impl AnonfilesExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for AnonfilesExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_download_link(html: &str, page_url: &Url) -> Option<Url> {
    let document = Html::parse_document(html);
    dom::attr_values(&document, &DOWNLOAD_ANCHOR, "href")
        .first()
        .and_then(|href| dom::absolutize(page_url, href))
}

#[async_trait]
impl Extractor for AnonfilesExtractor {
    fn name(&self) -> &'static str {
        "Anonfiles"
    }

    fn domains(&self) -> &'static [&'static str] {
        &["anonfiles.com"]
    }

    async fn fetch(&self, mapper: &ScrapeMapper, url: &Url) -> DomainItem {
        let mut domain = DomainItem::new(self.base_domain(url));
        let Some(body) = fetch_page(mapper, url).await else {
            return domain;
        };
        let Some(media) = parse_download_link(&body, url) else {
            debug!(%url, "page held no download anchor");
            return domain;
        };
        domain.add_to_album(&loose_files_title(self.name()), media, url.clone());
        domain
    }
}
