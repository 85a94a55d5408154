//! Gfycat and Redgifs clip pages. The player boots from embedded JSON,
//! so the mp4 link is lifted straight out of the page source.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tracing::debug;
use url::Url;

use crate::cascade::DomainItem;
use crate::mapper::ScrapeMapper;

use super::{Extractor, fetch_page};

#[allow(clippy::expect_used)]
static VIDEO_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""(?:mp4Url|contentUrl|hd)"\s*:\s*"([^"]+)""#).expect("video regex is valid")
});

/// Gfycat and Redgifs hosts.
pub struct GfycatExtractor;

impl GfycatExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for GfycatExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// First embedded video link. JSON escaping on the slashes is undone.
fn parse_video_url(html: &str) -> Option<Url> {
    VIDEO_URL
        .captures(html)
        .and_then(|captures| captures.get(1))
        .map(|link| link.as_str().replace("\\/", "/"))
        .and_then(|link| Url::parse(&link).ok())
}

#[async_trait]
impl Extractor for GfycatExtractor {
    fn name(&self) -> &'static str {
        "Gfycat"
    }

    fn domains(&self) -> &'static [&'static str] {
        &["gfycat.com", "redgifs.com"]
    }

    async fn fetch(&self, mapper: &ScrapeMapper, url: &Url) -> DomainItem {
        let base = self.base_domain(url);
        let mut domain = DomainItem::new(base.clone());
        let Some(body) = fetch_page(mapper, url).await else {
            return domain;
        };
        let Some(media) = parse_video_url(&body) else {
            debug!(%url, "page held no embedded video");
            return domain;
        };
        domain.add_to_album(&format!("{base}/gifs"), media, url.clone());
        domain
    }
}
