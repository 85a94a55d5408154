//! Saint video pages. The clip sits in a plain `<video>` player with an
//! `og:video` meta as backup.

use std::sync::LazyLock;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::cascade::DomainItem;
use crate::mapper::ScrapeMapper;

use super::{Extractor, dom, fetch_page, loose_files_title};

#[allow(clippy::expect_used)]
static VIDEO_SOURCE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("video source").expect("source selector is valid"));

#[allow(clippy::expect_used)]
static OG_VIDEO: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("meta[property=\"og:video\"]").expect("og:video selector is valid")
});

/// Saint host.
pub struct SaintExtractor;

impl SaintExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for SaintExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_video(html: &str, page_url: &Url) -> Option<Url> {
    let document = Html::parse_document(html);
    dom::attr_values(&document, &VIDEO_SOURCE, "src")
        .first()
        .and_then(|src| dom::absolutize(page_url, src))
        .or_else(|| {
            dom::meta_content(&document, &OG_VIDEO)
                .and_then(|content| dom::absolutize(page_url, &content))
        })
}

#[async_trait]
impl Extractor for SaintExtractor {
    fn name(&self) -> &'static str {
        "Saint"
    }

    fn domains(&self) -> &'static [&'static str] {
        &["saint.to"]
    }

    async fn fetch(&self, mapper: &ScrapeMapper, url: &Url) -> DomainItem {
        let mut domain = DomainItem::new(self.base_domain(url));
        let Some(body) = fetch_page(mapper, url).await else {
            return domain;
        };
        let Some(media) = parse_video(&body, url) else {
            debug!(%url, "page held no video source");
            return domain;
        };
        domain.add_to_album(&loose_files_title(self.name()), media, url.clone());
        domain
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PLAYER_FIXTURE: &str = r#"<html>
<head><meta property="og:video" content="https://simp2.saint.to/videos/fallback.mp4"></head>
<body>
  <video id="main-video" controls>
    <source src="https://simp2.saint.to/videos/clip77.mp4" type="video/mp4">
  </video>
</body>
</html>"#;

    const META_ONLY_FIXTURE: &str = r#"<html>
<head><meta property="og:video" content="/videos/fallback.mp4"></head>
<body></body>
</html>"#;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_parse_video_prefers_player_source() {
        let page = url("https://saint.to/embed/xyz");
        assert_eq!(
            parse_video(PLAYER_FIXTURE, &page).unwrap().as_str(),
            "https://simp2.saint.to/videos/clip77.mp4"
        );
    }

    #[test]
    fn test_parse_video_falls_back_to_og_meta() {
        let page = url("https://saint.to/embed/xyz");
        assert_eq!(
            parse_video(META_ONLY_FIXTURE, &page).unwrap().as_str(),
            "https://saint.to/videos/fallback.mp4"
        );
    }

    #[test]
    fn test_parse_video_missing() {
        let page = url("https://saint.to/embed/xyz");
        assert!(parse_video("<html></html>", &page).is_none());
    }
}
