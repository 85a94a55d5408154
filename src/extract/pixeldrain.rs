//! Pixeldrain lists and single files. Both resolve to the JSON API;
//! the `?download` form of a file link serves the bytes with a usable
//! `Content-Disposition` name.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::cascade::DomainItem;
use crate::mapper::ScrapeMapper;
use crate::naming;

use super::{Extractor, loose_files_title};

const DEFAULT_API_BASE: &str = "https://pixeldrain.com/api";

#[derive(Debug, Deserialize)]
struct ListData {
    #[serde(default)]
    files: Vec<ListFile>,
}

#[derive(Debug, Deserialize)]
struct ListFile {
    id: String,
}

#[derive(Debug, PartialEq, Eq)]
enum Link<'a> {
    List(&'a str),
    File(&'a str),
}

/// Pixeldrain host.
pub struct PixeldrainExtractor {
    api_base: String,
}

impl PixeldrainExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::with_api_base(DEFAULT_API_BASE)
    }

    /// Points the extractor at a different API origin. Used by tests.
    #[must_use]
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
        }
    }
}

impl Default for PixeldrainExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Classifies `/l/<id>` list links and `/u/<id>` file links.
fn classify_link(url: &Url) -> Option<Link<'_>> {
    let mut segments = url.path_segments()?;
    match (segments.next(), segments.next()) {
        (Some("l"), Some(id)) if !id.is_empty() => Some(Link::List(id)),
        (Some("u"), Some(id)) if !id.is_empty() => Some(Link::File(id)),
        _ => None,
    }
}

fn file_url(id: &str) -> Option<Url> {
    Url::parse(&format!("https://pixeldrain.com/api/file/{id}?download")).ok()
}

#[async_trait]
impl Extractor for PixeldrainExtractor {
    fn name(&self) -> &'static str {
        "Pixeldrain"
    }

    fn domains(&self) -> &'static [&'static str] {
        &["pixeldrain.com"]
    }

    async fn fetch(&self, mapper: &ScrapeMapper, url: &Url) -> DomainItem {
        let mut domain = DomainItem::new(self.base_domain(url));
        match classify_link(url) {
            Some(Link::File(id)) => {
                if let Some(media) = file_url(id) {
                    domain.add_to_album(&loose_files_title(self.name()), media, url.clone());
                }
            }
            Some(Link::List(id)) => {
                let endpoint = format!("{}/list/{id}", self.api_base);
                let response = match mapper.session().client().get(&endpoint).send().await {
                    Ok(response) => response,
                    Err(e) => {
                        warn!(%url, error = %e, "list request failed");
                        return domain;
                    }
                };
                let list: ListData = match response.json().await {
                    Ok(list) => list,
                    Err(e) => {
                        warn!(%url, error = %e, "list response was not valid JSON");
                        return domain;
                    }
                };
                let title = naming::sanitize_title(id);
                for file in &list.files {
                    if let Some(media) = file_url(&file.id) {
                        domain.add_to_album(&title, media, url.clone());
                    }
                }
            }
            None => debug!(%url, "link is neither a list nor a file"),
        }
        domain
    }
}
