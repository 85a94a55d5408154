//! Hierarchical work model for discovered media links.
//!
//! Extraction accumulates everything into one `CascadeItem` per run:
//! domains own albums, albums own `(media, referrer)` pairs. The cascade
//! is mutated only while scraping; once downloading starts it is frozen.
//!
//! Maps are `BTreeMap` so a run walks domains and albums in a stable
//! order regardless of extraction interleaving.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};

use url::Url;

/// One downloadable asset: the media URL plus the referrer the host
/// expects to see on the CDN fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPair {
    pub media: Url,
    pub referrer: Url,
}

impl LinkPair {
    #[must_use]
    pub fn new(media: Url, referrer: Url) -> Self {
        Self { media, referrer }
    }
}

/// A titled collection of link pairs, downloaded into one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumItem {
    pub title: String,
    pub link_pairs: Vec<LinkPair>,
    /// Some hosts protect albums with a password the extractor scraped.
    pub password: Option<String>,
}

impl AlbumItem {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            link_pairs: Vec::new(),
            password: None,
        }
    }

    /// Appends a pair; album order is append order.
    pub fn add_link_pair(&mut self, media: Url, referrer: Url) {
        self.link_pairs.push(LinkPair::new(media, referrer));
    }

    /// Merges another album with the same title by concatenating pairs.
    fn merge(&mut self, other: AlbumItem) {
        self.link_pairs.extend(other.link_pairs);
        if self.password.is_none() {
            self.password = other.password;
        }
    }

    /// Keeps the first occurrence of each media URL, dropping later
    /// duplicates. The first referrer wins.
    fn dedupe(&mut self) {
        let mut seen = HashSet::new();
        self.link_pairs
            .retain(|pair| seen.insert(pair.media.as_str().to_owned()));
    }
}

/// All albums discovered for one host domain. Titles are unique per
/// domain; adding an album under an existing title merges into it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainItem {
    pub domain: String,
    pub albums: BTreeMap<String, AlbumItem>,
}

impl DomainItem {
    #[must_use]
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            albums: BTreeMap::new(),
        }
    }

    /// Finds-or-creates the album for `title` and appends the pair.
    pub fn add_to_album(&mut self, title: &str, media: Url, referrer: Url) {
        self.albums
            .entry(title.to_string())
            .or_insert_with(|| AlbumItem::new(title))
            .add_link_pair(media, referrer);
    }

    /// Inserts a whole album, merging if the title is already present.
    pub fn add_album(&mut self, album: AlbumItem) {
        match self.albums.entry(album.title.clone()) {
            Entry::Occupied(mut existing) => existing.get_mut().merge(album),
            Entry::Vacant(slot) => {
                slot.insert(album);
            }
        }
    }

    fn merge(&mut self, other: DomainItem) {
        for album in other.albums.into_values() {
            self.add_album(album);
        }
    }
}

/// Top-level aggregate for one run. Created empty, filled by the scrape
/// mapper, deduped once, then handed to the download phase read-only.
#[derive(Debug, Clone, Default)]
pub struct CascadeItem {
    pub domains: BTreeMap<String, DomainItem>,
}

impl CascadeItem {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds-or-creates domain and album, then appends the pair.
    pub fn add_to_album(&mut self, domain: &str, title: &str, media: Url, referrer: Url) {
        self.domains
            .entry(domain.to_string())
            .or_insert_with(|| DomainItem::new(domain))
            .add_to_album(title, media, referrer);
    }

    /// Merges a whole `DomainItem` (an extractor's output) into the cascade.
    pub fn add_albums(&mut self, domain_item: DomainItem) {
        match self.domains.entry(domain_item.domain.clone()) {
            Entry::Occupied(mut existing) => existing.get_mut().merge(domain_item),
            Entry::Vacant(slot) => {
                slot.insert(domain_item);
            }
        }
    }

    /// Merges another cascade into this one, domain by domain.
    pub fn extend(&mut self, other: CascadeItem) {
        for domain in other.domains.into_values() {
            self.add_albums(domain);
        }
    }

    /// Rewrites every album title to `prefix/old_title`.
    ///
    /// Used when a forum post delegates to another extractor, so nested
    /// albums stay grouped under the thread title. Rewritten titles that
    /// collide are merged like any other same-title albums.
    pub fn append_title(&mut self, prefix: &str) {
        if prefix.is_empty() {
            return;
        }
        for domain in self.domains.values_mut() {
            let albums = std::mem::take(&mut domain.albums);
            for (_, mut album) in albums {
                album.title = format!("{prefix}/{}", album.title);
                domain.add_album(album);
            }
        }
    }

    /// Removes duplicate media URLs within each album (first wins).
    /// Cross-album duplicates are kept; the same image may legitimately
    /// appear in two albums.
    pub fn dedupe(&mut self) {
        for domain in self.domains.values_mut() {
            for album in domain.albums.values_mut() {
                album.dedupe();
            }
        }
    }

    /// True iff no album anywhere holds a link pair.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.domains
            .values()
            .all(|domain| domain.albums.values().all(|a| a.link_pairs.is_empty()))
    }

    /// Total number of link pairs across all albums.
    #[must_use]
    pub fn total_links(&self) -> usize {
        self.domains
            .values()
            .flat_map(|domain| domain.albums.values())
            .map(|album| album.link_pairs.len())
            .sum()
    }
}
