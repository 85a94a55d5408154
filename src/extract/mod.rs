//! Site-specific extractors and the host dispatch table.
//!
//! Each supported host family gets one [`Extractor`] implementation that
//! turns a page URL into a [`DomainItem`] of albums. Extractors never
//! fail outward: parse and transport errors are logged and whatever was
//! gathered so far is returned, possibly empty.
//!
//! Parsing itself is factored into pure `(html, url)` functions inside
//! each submodule, unit-tested against checked-in fixtures, so the
//! network layer stays a thin shell.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use url::Url;

use crate::cascade::DomainItem;
use crate::mapper::ScrapeMapper;
use crate::naming::{self, MediaKind};

mod anonfiles;
mod chibisafe;
mod coomer;
mod cyberfile;
pub(crate) mod dom;
mod erome;
pub mod forum;
mod gfycat;
mod gofile;
mod pixeldrain;
mod saint;
mod sharex;

pub use anonfiles::AnonfilesExtractor;
pub use chibisafe::ChibisafeExtractor;
pub use coomer::CoomerExtractor;
pub use cyberfile::CyberfileExtractor;
pub use erome::EromeExtractor;
pub use forum::ForumExtractor;
pub use gfycat::GfycatExtractor;
pub use gofile::GoFileExtractor;
pub use pixeldrain::PixeldrainExtractor;
pub use saint::SaintExtractor;
pub use sharex::ShareXExtractor;

/// Subdomains that serve media bytes directly, no HTML in between.
#[allow(clippy::expect_used)]
static DIRECT_SUBDOMAIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:cdn\d*|i|img|img-\d+|media-files\d*|fs-\d+|stream)$")
        .expect("direct subdomain regex is valid")
});

/// One site family's scraper.
///
/// `fetch` is the whole contract: given a page URL it returns the albums
/// found there. It must not fail; errors degrade to partial output.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Short display name, also used for loose-file album titles.
    fn name(&self) -> &'static str;

    /// Base domains this extractor serves.
    fn domains(&self) -> &'static [&'static str];

    /// Scrapes `url` into albums under this extractor's domain.
    async fn fetch(&self, mapper: &ScrapeMapper, url: &Url) -> DomainItem;

    /// The served base domain for `url`, falling back to the URL host.
    fn base_domain(&self, url: &Url) -> String {
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        self.domains()
            .iter()
            .find(|domain| host_matches(&host, domain))
            .map_or(host, |domain| (*domain).to_string())
    }
}

/// True iff `host` is `domain` itself or one of its subdomains.
pub(crate) fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Fetches a page body for an extractor, logging any failure.
///
/// Extractors treat a `None` as "nothing found here" and move on; one
/// bad page never aborts the run.
pub(crate) async fn fetch_page(mapper: &ScrapeMapper, url: &Url) -> Option<String> {
    let response = match mapper.session().client().get(url.clone()).send().await {
        Ok(response) => response,
        Err(error) => {
            tracing::warn!(%url, %error, "page fetch failed");
            return None;
        }
    };
    if !response.status().is_success() {
        tracing::warn!(%url, status = response.status().as_u16(), "page fetch refused");
        return None;
    }
    match response.text().await {
        Ok(body) => Some(body),
        Err(error) => {
            tracing::warn!(%url, %error, "page body unreadable");
            None
        }
    }
}

/// The dispatch table: base domain to extractor.
pub struct ExtractorSet {
    extractors: Vec<Box<dyn Extractor>>,
}

impl ExtractorSet {
    /// An empty set; [`ExtractorSet::register`] adds entries.
    #[must_use]
    pub fn new() -> Self {
        Self {
            extractors: Vec::new(),
        }
    }

    /// The full built-in table from the supported-host list.
    #[must_use]
    pub fn with_default_extractors() -> Self {
        let mut set = Self::new();
        set.register(Box::new(ChibisafeExtractor::cyberdrop()));
        set.register(Box::new(ChibisafeExtractor::bunkr()));
        set.register(Box::new(ShareXExtractor::new()));
        set.register(Box::new(EromeExtractor::new()));
        set.register(Box::new(GoFileExtractor::new()));
        set.register(Box::new(PixeldrainExtractor::new()));
        set.register(Box::new(AnonfilesExtractor::new()));
        set.register(Box::new(CoomerExtractor::new()));
        set.register(Box::new(CyberfileExtractor::new()));
        set.register(Box::new(GfycatExtractor::new()));
        set.register(Box::new(SaintExtractor::new()));
        set.register(Box::new(ForumExtractor::new()));
        set
    }

    pub fn register(&mut self, extractor: Box<dyn Extractor>) {
        self.extractors.push(extractor);
    }

    /// Finds the extractor serving `host`, with the matched base domain.
    ///
    /// `host` must already be lowercase. Subdomains match their base
    /// domain, so `i.pixl.is` dispatches like `pixl.is`.
    #[must_use]
    pub fn dispatch(&self, host: &str) -> Option<(&dyn Extractor, &'static str)> {
        self.extractors.iter().find_map(|extractor| {
            extractor
                .domains()
                .iter()
                .find(|domain| host_matches(host, domain))
                .map(|domain| (extractor.as_ref(), *domain))
        })
    }
}

impl Default for ExtractorSet {
    fn default() -> Self {
        Self::with_default_extractors()
    }
}

/// True iff `host` is a direct-CDN subdomain of `base`, meaning the URL
/// already points at media bytes and needs no extractor fetch.
#[must_use]
pub fn is_direct_link(host: &str, base: &str) -> bool {
    host.strip_suffix(base)
        .and_then(|prefix| prefix.strip_suffix('.'))
        .is_some_and(|subdomain| DIRECT_SUBDOMAIN.is_match(subdomain))
}

/// Applies the host-specific rewrites a direct link needs before download.
///
/// Bunkr serves videos only from its `media-files.` subdomain, whatever
/// CDN host the page linked. Thumbnail infixes (`.md.`, `.th.`) on any
/// host are rewritten to the full-size form.
#[must_use]
pub fn rewrite_direct_link(url: &Url, base: &str) -> Url {
    let mut rewritten = url.clone();

    if base.contains("bunkr")
        && naming::file_extension(url.path()).and_then(naming::classify_extension)
            == Some(MediaKind::Video)
    {
        let _ = rewritten.set_host(Some(&format!("media-files.{base}")));
    }

    let path = rewritten.path();
    if path.contains(".md.") || path.contains(".th.") {
        let full_size = path.replace(".md.", ".").replace(".th.", ".");
        rewritten.set_path(&full_size);
    }

    rewritten
}

/// Album title for direct links that arrive outside any album.
#[must_use]
pub fn loose_files_title(extractor_name: &str) -> String {
    format!("{extractor_name} Loose Files")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    // ==================== Dispatch Tests ====================

    #[test]
    fn test_dispatch_exact_domain() {
        let set = ExtractorSet::with_default_extractors();
        let (extractor, base) = set.dispatch("erome.com").unwrap();
        assert_eq!(extractor.name(), "Erome");
        assert_eq!(base, "erome.com");
    }

    #[test]
    fn test_dispatch_subdomain_maps_to_base() {
        let set = ExtractorSet::with_default_extractors();
        let (extractor, base) = set.dispatch("i.pixl.is").unwrap();
        assert_eq!(extractor.name(), "ShareX");
        assert_eq!(base, "pixl.is");
    }

    #[test]
    fn test_dispatch_rejects_lookalike_host() {
        let set = ExtractorSet::with_default_extractors();
        // Suffix without a dot boundary is a different domain.
        assert!(set.dispatch("notpixl.is").is_none());
        assert!(set.dispatch("example.com").is_none());
    }

    #[test]
    fn test_dispatch_covers_all_host_families() {
        let set = ExtractorSet::with_default_extractors();
        for host in [
            "cyberdrop.me",
            "bunkr.is",
            "jpg.church",
            "erome.com",
            "gofile.io",
            "pixeldrain.com",
            "anonfiles.com",
            "coomer.party",
            "kemono.party",
            "cyberfile.me",
            "gfycat.com",
            "redgifs.com",
            "saint.to",
            "thotsbay.com",
            "socialmediagirls.com",
        ] {
            assert!(set.dispatch(host).is_some(), "no extractor for {host}");
        }
    }

    // ==================== Direct Link Tests ====================

    #[test]
    fn test_direct_link_subdomains() {
        assert!(is_direct_link("i.pixl.is", "pixl.is"));
        assert!(is_direct_link("cdn.bunkr.is", "bunkr.is"));
        assert!(is_direct_link("cdn3.cyberdrop.me", "cyberdrop.me"));
        assert!(is_direct_link("img-004.putme.ga", "putme.ga"));
        assert!(is_direct_link("media-files.bunkr.is", "bunkr.is"));
        assert!(is_direct_link("fs-01.cyberdrop.me", "cyberdrop.me"));
        assert!(is_direct_link("stream.saint.to", "saint.to"));
    }

    #[test]
    fn test_album_hosts_are_not_direct_links() {
        assert!(!is_direct_link("pixl.is", "pixl.is"));
        assert!(!is_direct_link("www.erome.com", "erome.com"));
        assert!(!is_direct_link("bunkr.is", "bunkr.is"));
    }

    #[test]
    fn test_bunkr_video_rewritten_to_media_files_host() {
        let rewritten = rewrite_direct_link(&url("https://cdn.bunkr.is/clip.mp4"), "bunkr.is");
        assert_eq!(rewritten.as_str(), "https://media-files.bunkr.is/clip.mp4");
    }

    #[test]
    fn test_bunkr_image_host_not_rewritten() {
        let rewritten = rewrite_direct_link(&url("https://cdn.bunkr.is/pic.jpg"), "bunkr.is");
        assert_eq!(rewritten.as_str(), "https://cdn.bunkr.is/pic.jpg");
    }

    #[test]
    fn test_thumbnail_infix_rewritten_to_full_size() {
        let md = rewrite_direct_link(&url("https://i.pixl.is/abc.md.jpg"), "pixl.is");
        assert_eq!(md.as_str(), "https://i.pixl.is/abc.jpg");
        let th = rewrite_direct_link(&url("https://i.pixl.is/abc.th.png"), "pixl.is");
        assert_eq!(th.as_str(), "https://i.pixl.is/abc.png");
    }

    #[test]
    fn test_loose_files_title_format() {
        assert_eq!(loose_files_title("ShareX"), "ShareX Loose Files");
    }
}
