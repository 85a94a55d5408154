//! Coomer and Kemono creator feeds. A creator page lists post cards in
//! offset-paginated batches; each post page carries the actual file
//! thumbs and attachments. Single post links skip the feed walk.

use std::sync::LazyLock;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::cascade::DomainItem;
use crate::mapper::ScrapeMapper;
use crate::naming;

use super::{Extractor, dom, fetch_page, loose_files_title};

/// Posts per feed page, which is also the `?o=` offset step.
const POSTS_PER_PAGE: usize = 25;

#[allow(clippy::expect_used)]
static POST_CARDS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".post-card__heading a").expect("post card selector is valid")
});

#[allow(clippy::expect_used)]
static CREATOR_NAME: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("span[itemprop=\"name\"], a.post__user-name")
        .expect("creator selector is valid")
});

#[allow(clippy::expect_used)]
static FILE_THUMBS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.fileThumb").expect("thumb selector is valid"));

#[allow(clippy::expect_used)]
static ATTACHMENTS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a.post__attachment-link").expect("attachment selector is valid")
});

/// Coomer and Kemono hosts.
pub struct CoomerExtractor;

impl CoomerExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    async fn collect_post(
        &self,
        mapper: &ScrapeMapper,
        domain: &mut DomainItem,
        title: &str,
        post: &Url,
    ) {
        let Some(body) = fetch_page(mapper, post).await else {
            return;
        };
        for media in parse_post_media(&body, post) {
            domain.add_to_album(title, media, post.clone());
        }
    }
}

impl Default for CoomerExtractor {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_creator_name(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    dom::first_text(&document, &CREATOR_NAME)
}

/// Post page links from one feed page.
fn parse_post_pages(html: &str, page_url: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    dom::attr_values(&document, &POST_CARDS, "href")
        .iter()
        .filter_map(|href| dom::absolutize(page_url, href))
        .collect()
}

/// File thumbs and attachment links from one post page.
fn parse_post_media(html: &str, post_url: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let mut links: Vec<Url> = dom::attr_values(&document, &FILE_THUMBS, "href")
        .iter()
        .filter_map(|href| dom::absolutize(post_url, href))
        .collect();
    links.extend(
        dom::attr_values(&document, &ATTACHMENTS, "href")
            .iter()
            .filter_map(|href| dom::absolutize(post_url, href)),
    );
    links
}

fn is_post(url: &Url) -> bool {
    url.path().contains("/post/")
}

#[async_trait]
impl Extractor for CoomerExtractor {
    fn name(&self) -> &'static str {
        "Coomer"
    }

    fn domains(&self) -> &'static [&'static str] {
        &["coomer.party", "kemono.party"]
    }

    async fn fetch(&self, mapper: &ScrapeMapper, url: &Url) -> DomainItem {
        let mut domain = DomainItem::new(self.base_domain(url));

        if is_post(url) {
            let Some(body) = fetch_page(mapper, url).await else {
                return domain;
            };
            let title = parse_creator_name(&body)
                .map(|name| naming::sanitize_title(&name))
                .unwrap_or_else(|| loose_files_title(self.name()));
            for media in parse_post_media(&body, url) {
                domain.add_to_album(&title, media, url.clone());
            }
            return domain;
        }

        let mut title: Option<String> = None;
        let mut offset = 0usize;
        loop {
            let mut page_url = url.clone();
            page_url.set_query(Some(&format!("o={offset}")));
            let Some(body) = fetch_page(mapper, &page_url).await else {
                break;
            };
            if title.is_none() {
                title = parse_creator_name(&body).map(|name| naming::sanitize_title(&name));
            }
            let posts = parse_post_pages(&body, &page_url);
            if posts.is_empty() {
                debug!(%page_url, "feed page held no posts, stopping");
                break;
            }
            let album = title
                .clone()
                .unwrap_or_else(|| loose_files_title(self.name()));
            for post in posts {
                self.collect_post(mapper, &mut domain, &album, &post).await;
            }
            offset += POSTS_PER_PAGE;
        }
        domain
    }
}
