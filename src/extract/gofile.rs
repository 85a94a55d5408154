//! GoFile folders. The site is a JSON API behind a JS front end: a
//! throwaway account token unlocks `getContent`, folders nest, and the
//! download links need the token planted as a cookie.

use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, warn};
use url::Url;

use crate::cascade::DomainItem;
use crate::mapper::ScrapeMapper;
use crate::naming;

use super::Extractor;

const DEFAULT_API_BASE: &str = "https://api.gofile.io";

/// Fixed token the web front end sends alongside every content request.
const WEBSITE_TOKEN: &str = "12345";

#[derive(Debug, Deserialize)]
struct ApiEnvelope<T> {
    status: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct AccountData {
    token: String,
}

#[derive(Debug, Deserialize)]
struct FolderData {
    name: Option<String>,
    #[serde(default)]
    contents: HashMap<String, ContentNode>,
}

#[derive(Debug, Deserialize)]
struct ContentNode {
    #[serde(rename = "type")]
    kind: String,
    link: Option<String>,
    code: Option<String>,
}

/// GoFile folder host.
pub struct GoFileExtractor {
    api_base: String,
    token: OnceCell<Option<String>>,
}

impl GoFileExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self::with_api_base(DEFAULT_API_BASE)
    }

    /// Points the extractor at a different API origin. Used by tests.
    #[must_use]
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            token: OnceCell::new(),
        }
    }

    /// Account token for this run, created on first use. `None` once
    /// creation has failed; the failure is not retried.
    async fn token(&self, mapper: &ScrapeMapper) -> Option<&str> {
        self.token
            .get_or_init(|| async {
                let token = create_account(mapper, &self.api_base).await?;
                if let Ok(root) = Url::parse("https://gofile.io/") {
                    let cookie = format!("accountToken={token}; Domain=.gofile.io");
                    mapper.session().add_cookie(&root, &cookie);
                }
                Some(token)
            })
            .await
            .as_deref()
    }

    async fn fetch_folder(
        &self,
        mapper: &ScrapeMapper,
        token: &str,
        code: &str,
    ) -> Option<FolderData> {
        let endpoint = format!(
            "{}/getContent?contentId={code}&token={token}&websiteToken={WEBSITE_TOKEN}",
            self.api_base
        );
        let response = match mapper.session().client().get(&endpoint).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(code, error = %e, "folder request failed");
                return None;
            }
        };
        let envelope: ApiEnvelope<FolderData> = match response.json().await {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(code, error = %e, "folder response was not valid JSON");
                return None;
            }
        };
        if envelope.status != "ok" {
            warn!(code, status = %envelope.status, "folder request refused");
            return None;
        }
        envelope.data
    }
}

impl Default for GoFileExtractor {
    fn default() -> Self {
        Self::new()
    }
}

async fn create_account(mapper: &ScrapeMapper, api_base: &str) -> Option<String> {
    let endpoint = format!("{api_base}/createAccount");
    let response = match mapper.session().client().get(&endpoint).send().await {
        Ok(response) => response,
        Err(e) => {
            warn!(error = %e, "account creation request failed");
            return None;
        }
    };
    let envelope: ApiEnvelope<AccountData> = match response.json().await {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "account response was not valid JSON");
            return None;
        }
    };
    if envelope.status != "ok" {
        warn!(status = %envelope.status, "account creation refused");
        return None;
    }
    envelope.data.map(|data| data.token)
}

/// Folder code from a `gofile.io/d/<code>` link.
fn folder_code(url: &Url) -> Option<&str> {
    let mut segments = url.path_segments()?;
    match (segments.next(), segments.next()) {
        (Some("d"), Some(code)) if !code.is_empty() => Some(code),
        _ => None,
    }
}

#[async_trait]
impl Extractor for GoFileExtractor {
    fn name(&self) -> &'static str {
        "GoFile"
    }

    fn domains(&self) -> &'static [&'static str] {
        &["gofile.io"]
    }

    async fn fetch(&self, mapper: &ScrapeMapper, url: &Url) -> DomainItem {
        let mut domain = DomainItem::new(self.base_domain(url));
        let Some(root) = folder_code(url) else {
            debug!(%url, "link is not a folder");
            return domain;
        };
        let Some(token) = self.token(mapper).await else {
            warn!(%url, "no account token, skipping folder");
            return domain;
        };

        let mut title: Option<String> = None;
        let mut queue = VecDeque::from([root.to_string()]);
        let mut visited: HashSet<String> = HashSet::new();
        while let Some(code) = queue.pop_front() {
            if !visited.insert(code.clone()) {
                continue;
            }
            let Some(folder) = self.fetch_folder(mapper, token, &code).await else {
                continue;
            };
            if title.is_none() {
                title = folder
                    .name
                    .as_deref()
                    .map(naming::sanitize_title)
                    .filter(|name| !name.is_empty());
            }
            let album = title.clone().unwrap_or_else(|| root.to_string());
            for node in folder.contents.values() {
                match node.kind.as_str() {
                    "folder" => {
                        if let Some(code) = &node.code {
                            queue.push_back(code.clone());
                        }
                    }
                    _ => {
                        if let Some(media) =
                            node.link.as_deref().and_then(|link| Url::parse(link).ok())
                        {
                            domain.add_to_album(&album, media, url.clone());
                        }
                    }
                }
            }
        }
        domain
    }
}
