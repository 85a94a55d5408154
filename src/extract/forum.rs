//! XenForo thread walker. Threads are parsed page by page into posts;
//! links hosted on the forum itself are kept as attachments, everything
//! else is handed back to the mapper so the matching extractor runs
//! under the thread's title.
//!
//! Login is optional and runs once per process, shared across every
//! thread in the run.

use std::collections::HashSet;
use std::sync::LazyLock;

use async_trait::async_trait;
use futures_util::future::join_all;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use crate::cascade::DomainItem;
use crate::mapper::ScrapeMapper;
use crate::naming;
use crate::session::Session;
use crate::settings::ForumAuth;

use super::{Extractor, dom, fetch_page, host_matches, loose_files_title};

#[allow(clippy::expect_used)]
static THREAD_TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("h1.p-title-value").expect("title selector is valid"));

#[allow(clippy::expect_used)]
static POSTS: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("article.message").expect("post selector is valid"));

#[allow(clippy::expect_used)]
static CONTENT_ANCHORS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".message-userContent a[href]").expect("anchor selector is valid")
});

#[allow(clippy::expect_used)]
static CONTENT_IMAGES: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(".message-userContent img[src]").expect("image selector is valid")
});

#[allow(clippy::expect_used)]
static NEXT_PAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.pageNav-jump--next").expect("next selector is valid"));

#[allow(clippy::expect_used)]
static LOGIN_TOKEN: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input[name=\"_xfToken\"]").expect("token selector is valid"));

#[derive(Debug)]
struct ForumPost {
    number: Option<u64>,
    links: Vec<Url>,
}

#[derive(Debug)]
struct ThreadPage {
    title: Option<String>,
    posts: Vec<ForumPost>,
    next_page: Option<Url>,
}

/// XenForo forum hosts.
pub struct ForumExtractor;

impl ForumExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for ForumExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// One thread page: title, posts with their embedded links, next link.
///
/// Same-host embedded images are kept only when they live under the
/// attachment or data trees; everything else under the forum host is
/// style furniture.
fn parse_thread_page(html: &str, page_url: &Url) -> ThreadPage {
    let document = Html::parse_document(html);

    let title = dom::first_text(&document, &THREAD_TITLE);
    let next_page = dom::attr_values(&document, &NEXT_PAGE, "href")
        .first()
        .and_then(|href| dom::absolutize(page_url, href));

    let page_host = page_url.host_str().unwrap_or_default().to_lowercase();
    let mut posts = Vec::new();
    for post in document.select(&POSTS) {
        let number = post
            .value()
            .attr("data-content")
            .and_then(|content| content.strip_prefix("post-"))
            .and_then(|number| number.parse().ok());

        let mut links: Vec<Url> = post
            .select(&CONTENT_ANCHORS)
            .filter_map(|anchor| anchor.value().attr("href"))
            .filter(|href| !href.trim_start().starts_with('#'))
            .filter_map(|href| dom::absolutize(page_url, href))
            .collect();
        links.extend(
            post.select(&CONTENT_IMAGES)
                .filter_map(|img| img.value().attr("src"))
                .filter_map(|src| dom::absolutize(page_url, src))
                .filter(|link| {
                    let host = link.host_str().unwrap_or_default().to_lowercase();
                    host != page_host
                        || link.path().contains("/attachments/")
                        || link.path().contains("/data/")
                }),
        );

        posts.push(ForumPost { number, links });
    }

    ThreadPage {
        title,
        posts,
        next_page,
    }
}

/// Minimum post number requested by the seed, from a `#post-<N>`
/// fragment or a `/post-<N>` path tail.
fn post_floor(url: &Url) -> Option<u64> {
    if let Some(fragment) = url.fragment()
        && let Some(number) = fragment.strip_prefix("post-")
        && let Ok(number) = number.parse()
    {
        return Some(number);
    }
    let last = url.path_segments()?.filter(|s| !s.is_empty()).next_back()?;
    last.strip_prefix("post-")?.parse().ok()
}

fn parse_login_token(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    dom::attr_values(&document, &LOGIN_TOKEN, "value")
        .into_iter()
        .find(|token| !token.is_empty())
}

/// Performs the XenForo login handshake, leaving the session cookies in
/// the shared jar. Returns whether the forum accepted the credentials.
pub(crate) async fn login(session: &Session, base: &Url, auth: &ForumAuth) -> bool {
    let Ok(login_url) = base.join("/login") else {
        return false;
    };
    let body = match session.client().get(login_url).send().await {
        Ok(response) => match response.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!(%base, error = %e, "login page was unreadable");
                return false;
            }
        },
        Err(e) => {
            warn!(%base, error = %e, "login page request failed");
            return false;
        }
    };
    let Some(token) = parse_login_token(&body) else {
        warn!(%base, "login page held no csrf token");
        return false;
    };
    let Ok(post_url) = base.join("/login/login") else {
        return false;
    };
    let form = [
        ("login", auth.username()),
        ("password", auth.password()),
        ("_xfToken", token.as_str()),
        ("remember", "1"),
    ];
    match session.client().post(post_url).form(&form).send().await {
        Ok(response) if response.status().is_success() => {
            info!(host = %base, "forum login succeeded");
            true
        }
        Ok(response) => {
            warn!(host = %base, status = %response.status(), "forum login rejected");
            false
        }
        Err(e) => {
            warn!(host = %base, error = %e, "forum login request failed");
            false
        }
    }
}

#[async_trait]
impl Extractor for ForumExtractor {
    fn name(&self) -> &'static str {
        "Forum"
    }

    fn domains(&self) -> &'static [&'static str] {
        &["thotsbay.com", "socialmediagirls.com"]
    }

    async fn fetch(&self, mapper: &ScrapeMapper, url: &Url) -> DomainItem {
        let base = self.base_domain(url);
        let mut domain = DomainItem::new(base.clone());

        if !mapper.ensure_forum_login(url).await {
            warn!(%url, "continuing without forum login");
        }

        let floor = post_floor(url);
        let mut thread_title: Option<String> = None;
        let mut visited: HashSet<String> = HashSet::new();
        let mut current = url.clone();
        loop {
            let mut page_key = current.clone();
            page_key.set_fragment(None);
            if !visited.insert(page_key.as_str().to_string()) {
                break;
            }

            let Some(body) = fetch_page(mapper, &current).await else {
                break;
            };
            let page = parse_thread_page(&body, &current);
            if thread_title.is_none() {
                thread_title = page
                    .title
                    .as_deref()
                    .map(naming::sanitize_title)
                    .filter(|title| !title.is_empty());
            }
            let title = thread_title.clone().unwrap_or_else(|| {
                naming::filename_from_url(url)
                    .map(|name| naming::sanitize_title(&name))
                    .unwrap_or_else(|| loose_files_title(self.name()))
            });

            let mut delegated = Vec::new();
            for post in &page.posts {
                if let (Some(number), Some(floor)) = (post.number, floor)
                    && number < floor
                {
                    continue;
                }
                for link in &post.links {
                    let host = link.host_str().unwrap_or_default().to_lowercase();
                    if host_matches(&host, &base) {
                        domain.add_to_album(
                            &format!("{title}/Attachments"),
                            link.clone(),
                            current.clone(),
                        );
                    } else {
                        delegated.push(mapper.map_url(link.clone(), Some(title.clone())));
                    }
                }
            }
            join_all(delegated).await;

            match page.next_page {
                Some(next) => {
                    debug!(%next, "following next thread page");
                    current = next;
                }
                None => break,
            }
        }
        domain
    }
}
