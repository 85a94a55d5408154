//! Small helpers shared by the HTML extractors.
//!
//! Extractors parse with `scraper` inside pure functions and return
//! owned data; parsed documents never cross an await point.

use scraper::{Html, Selector};
use url::Url;

/// Resolves `href` against `base`, keeping only http(s) results.
///
/// Protocol-relative, relative, and absolute references all resolve;
/// `javascript:`, `mailto:` and friends are dropped.
pub(crate) fn absolutize(base: &Url, href: &str) -> Option<Url> {
    let resolved = base.join(href.trim()).ok()?;
    matches!(resolved.scheme(), "http" | "https").then_some(resolved)
}

/// Collects `attr` from every element matching `selector`.
pub(crate) fn attr_values(html: &Html, selector: &Selector, attr: &str) -> Vec<String> {
    html.select(selector)
        .filter_map(|element| element.value().attr(attr))
        .map(str::to_owned)
        .collect()
}

/// Trimmed text content of the first element matching `selector`.
pub(crate) fn first_text(html: &Html, selector: &Selector) -> Option<String> {
    let element = html.select(selector).next()?;
    let text: String = element.text().collect();
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

/// `content` attribute of the first element matching `selector`.
pub(crate) fn meta_content(html: &Html, selector: &Selector) -> Option<String> {
    html.select(selector)
        .next()
        .and_then(|element| element.value().attr("content"))
        .map(str::to_owned)
        .filter(|content| !content.is_empty())
}
