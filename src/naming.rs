//! Title sanitization, filename rules, and media classification.
//!
//! Album titles and output filenames each have their own character policy:
//! titles map forbidden characters to `-` so the album name stays readable,
//! filenames drop them outright. Both policies are idempotent, so a value
//! that already passed through comes out unchanged.

use std::path::{Path, PathBuf};

use url::Url;

/// Characters replaced with `-` in album titles.
const TITLE_REPLACE: [char; 10] = ['\\', '*', '?', ':', '"', '<', '>', '|', '.', '/'];

/// Characters removed from output filenames.
const FILENAME_REMOVE: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Longest filename stem kept on disk, in characters. The extension is
/// re-appended after truncation so classification still works.
const MAX_STEM_CHARS: usize = 100;

/// Image extensions, lowercase, without the leading dot.
pub const IMAGE_EXTENSIONS: [&str; 10] = [
    "jpg", "jpeg", "png", "gif", "webp", "jpe", "svg", "tif", "tiff", "jif",
];

/// Video extensions, lowercase, without the leading dot.
pub const VIDEO_EXTENSIONS: [&str; 17] = [
    "mpeg", "avchd", "webm", "mpv", "swf", "avi", "m4p", "wmv", "mp2", "m4v", "qt", "mpe", "mp4",
    "flv", "mov", "mpg", "ogg",
];

/// Audio extensions, lowercase, without the leading dot.
pub const AUDIO_EXTENSIONS: [&str; 4] = ["mp3", "flac", "wav", "m4a"];

/// Non-media extensions still worth saving (metadata dumps, torrents).
pub const OTHER_EXTENSIONS: [&str; 2] = ["json", "torrent"];

/// Broad media class of a file, keyed off its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Other,
}

/// Classifies an extension (without dot, any case) into a media kind.
///
/// Returns `None` for extensions outside all four sets; callers treat
/// those as "name not trustworthy" and fall back to server headers.
#[must_use]
pub fn classify_extension(extension: &str) -> Option<MediaKind> {
    let ext = extension.to_lowercase();
    let ext = ext.as_str();
    if IMAGE_EXTENSIONS.contains(&ext) {
        Some(MediaKind::Image)
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        Some(MediaKind::Video)
    } else if AUDIO_EXTENSIONS.contains(&ext) {
        Some(MediaKind::Audio)
    } else if OTHER_EXTENSIONS.contains(&ext) {
        Some(MediaKind::Other)
    } else {
        None
    }
}

/// Returns the extension of `filename` (text after the last dot), if any.
#[must_use]
pub fn file_extension(filename: &str) -> Option<&str> {
    match filename.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() => Some(ext),
        _ => None,
    }
}

/// Sanitizes an album title by mapping forbidden characters to `-`.
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| if TITLE_REPLACE.contains(&c) { '-' } else { c })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Sanitizes an output filename.
///
/// Forbidden characters are removed, anything from the first `v=` on is
/// dropped (playback query params leak into scraped names), the extension
/// is lowercased, and the stem is capped at 100 characters.
#[must_use]
pub fn sanitize_filename(filename: &str) -> String {
    let mut cleaned: String = filename
        .chars()
        .filter(|c| !FILENAME_REMOVE.contains(c) && !c.is_control())
        .collect();
    if let Some(pos) = cleaned.find("v=") {
        cleaned.truncate(pos);
    }
    let cleaned = cleaned.trim();

    match cleaned.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => {
            let stem: String = stem.chars().take(MAX_STEM_CHARS).collect();
            format!("{stem}.{}", ext.to_lowercase())
        }
        _ => cleaned.chars().take(MAX_STEM_CHARS).collect(),
    }
}

/// Derives a sanitized filename from the last non-empty path segment of a URL.
///
/// Returns `None` when the URL has no usable segment (or sanitization
/// leaves nothing), in which case the caller must ask the server.
#[must_use]
pub fn filename_from_url(url: &Url) -> Option<String> {
    let raw = url.path_segments()?.rfind(|segment| !segment.is_empty())?;
    let decoded = urlencoding::decode(raw).map_or_else(|_| raw.to_string(), |d| d.into_owned());
    let sanitized = sanitize_filename(&decoded);
    (!sanitized.is_empty()).then_some(sanitized)
}

/// Produces the `k`-th collision variant of a filename: `stem (k).ext`.
#[must_use]
pub fn numbered_variant(filename: &str, k: u32) -> String {
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !ext.is_empty() => format!("{stem} ({k}).{ext}"),
        _ => format!("{filename} ({k})"),
    }
}

/// Resolves an album title to a directory under `root`.
///
/// Titles may contain `/` from forum prefixing; each segment becomes one
/// directory level and is sanitized independently, so a malicious title
/// cannot climb out of the output root.
#[must_use]
pub fn album_path(root: &Path, title: &str) -> PathBuf {
    let mut path = root.to_path_buf();
    for segment in title.split('/') {
        let cleaned = sanitize_title(segment);
        if !cleaned.is_empty() {
            path.push(cleaned);
        }
    }
    path
}

/// Parses a `Content-Disposition` header to extract the filename.
///
/// Handles both:
/// - `attachment; filename="example.mp4"` (and the unquoted form)
/// - `attachment; filename*=UTF-8''example.mp4` (RFC 5987)
#[must_use]
pub fn parse_content_disposition(header: &str) -> Option<String> {
    // Try filename*= first (RFC 5987 encoded)
    if let Some(pos) = header.find("filename*=")
        && let Some(quote_pos) = header[pos + 10..].find("''")
    {
        let encoded = &header[pos + 10 + quote_pos + 2..];
        let end = encoded.find(';').unwrap_or(encoded.len());
        if let Ok(decoded) = urlencoding::decode(encoded[..end].trim()) {
            return Some(decoded.into_owned());
        }
    }

    if let Some(pos) = header.find("filename=") {
        let value = header[pos + 9..].trim();
        if let Some(stripped) = value.strip_prefix('"') {
            if let Some(end) = stripped.find('"') {
                return Some(stripped[..end].to_string());
            }
        } else {
            let end = value.find(';').unwrap_or(value.len());
            let filename = value[..end].trim();
            if !filename.is_empty() {
                return Some(filename.to_string());
            }
        }
    }

    None
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== Title Sanitization Tests ====================

    #[test]
    fn test_sanitize_title_replaces_forbidden_chars_with_dash() {
        assert_eq!(sanitize_title(r#"My\Album*Name?"#), "My-Album-Name-");
        assert_eq!(sanitize_title("a:b\"c<d>e|f"), "a-b-c-d-e-f");
        assert_eq!(sanitize_title("v1.2/final"), "v1-2-final");
    }

    #[test]
    fn test_sanitize_title_trims_whitespace() {
        assert_eq!(sanitize_title("  Vacation 2023  "), "Vacation 2023");
    }

    #[test]
    fn test_sanitize_title_idempotent() {
        let once = sanitize_title("Some.Album/With:Chars");
        assert_eq!(sanitize_title(&once), once);
    }

    // ==================== Filename Sanitization Tests ====================

    #[test]
    fn test_sanitize_filename_removes_forbidden_chars() {
        assert_eq!(sanitize_filename("fi<le>na:me.jpg"), "filename.jpg");
        assert_eq!(sanitize_filename("a/b\\c|d?e*f.png"), "abcdef.png");
    }

    #[test]
    fn test_sanitize_filename_truncates_at_playback_param() {
        assert_eq!(sanitize_filename("clip.mp4?v=12345"), "clip.mp4");
        assert_eq!(sanitize_filename("clip.mp4v=12345"), "clip.mp4");
    }

    #[test]
    fn test_sanitize_filename_lowercases_extension() {
        assert_eq!(sanitize_filename("PHOTO.JPG"), "PHOTO.jpg");
    }

    #[test]
    fn test_sanitize_filename_caps_stem_at_hundred_chars() {
        let long = format!("{}.jpg", "a".repeat(150));
        let result = sanitize_filename(&long);
        assert_eq!(result.len(), 104);
        assert!(result.ends_with(".jpg"));
    }

    #[test]
    fn test_sanitize_filename_stem_cap_counts_chars_not_bytes() {
        let long = format!("{}.jpg", "ä".repeat(150));
        let result = sanitize_filename(&long);
        assert_eq!(result.chars().count(), 104);
    }

    #[test]
    fn test_sanitize_filename_idempotent() {
        let once = sanitize_filename("we?ird:na*me.WEBM");
        assert_eq!(sanitize_filename(&once), once);
    }

    // ==================== Classification Tests ====================

    #[test]
    fn test_classify_extension_all_sets() {
        assert_eq!(classify_extension("jpg"), Some(MediaKind::Image));
        assert_eq!(classify_extension("webm"), Some(MediaKind::Video));
        assert_eq!(classify_extension("flac"), Some(MediaKind::Audio));
        assert_eq!(classify_extension("torrent"), Some(MediaKind::Other));
    }

    #[test]
    fn test_classify_extension_case_insensitive() {
        assert_eq!(classify_extension("JPG"), Some(MediaKind::Image));
        assert_eq!(classify_extension("Mp4"), Some(MediaKind::Video));
    }

    #[test]
    fn test_classify_extension_unknown_returns_none() {
        assert_eq!(classify_extension("exe"), None);
        assert_eq!(classify_extension(""), None);
        assert_eq!(classify_extension("php"), None);
    }

    #[test]
    fn test_classification_sets_are_disjoint() {
        let all: Vec<&str> = IMAGE_EXTENSIONS
            .iter()
            .chain(VIDEO_EXTENSIONS.iter())
            .chain(AUDIO_EXTENSIONS.iter())
            .chain(OTHER_EXTENSIONS.iter())
            .copied()
            .collect();
        let unique: std::collections::HashSet<&str> = all.iter().copied().collect();
        assert_eq!(all.len(), unique.len(), "extension sets must not overlap");
    }

    // ==================== URL Filename Tests ====================

    #[test]
    fn test_filename_from_url_last_segment() {
        let url = Url::parse("https://cdn.example.com/a/b/photo.jpg").unwrap();
        assert_eq!(filename_from_url(&url), Some("photo.jpg".to_string()));
    }

    #[test]
    fn test_filename_from_url_skips_trailing_slash() {
        let url = Url::parse("https://cdn.example.com/photo.jpg/").unwrap();
        assert_eq!(filename_from_url(&url), Some("photo.jpg".to_string()));
    }

    #[test]
    fn test_filename_from_url_percent_decodes() {
        let url = Url::parse("https://cdn.example.com/my%20photo.jpg").unwrap();
        assert_eq!(filename_from_url(&url), Some("my photo.jpg".to_string()));
    }

    #[test]
    fn test_filename_from_url_empty_path_returns_none() {
        let url = Url::parse("https://cdn.example.com/").unwrap();
        assert_eq!(filename_from_url(&url), None);
    }

    // ==================== Collision Variant Tests ====================

    #[test]
    fn test_numbered_variant_inserts_before_extension() {
        assert_eq!(numbered_variant("photo.jpg", 1), "photo (1).jpg");
        assert_eq!(numbered_variant("photo.jpg", 12), "photo (12).jpg");
    }

    #[test]
    fn test_numbered_variant_no_extension_appends() {
        assert_eq!(numbered_variant("photo", 2), "photo (2)");
    }

    // ==================== Album Path Tests ====================

    #[test]
    fn test_album_path_single_level() {
        let path = album_path(Path::new("/out"), "Vacation 2023");
        assert_eq!(path, Path::new("/out/Vacation 2023"));
    }

    #[test]
    fn test_album_path_nested_from_forum_prefix() {
        let path = album_path(Path::new("/out"), "Thread Title/Album");
        assert_eq!(path, Path::new("/out/Thread Title/Album"));
    }

    #[test]
    fn test_album_path_sanitizes_each_segment() {
        let path = album_path(Path::new("/out"), "Thre:ad/Alb*um");
        assert_eq!(path, Path::new("/out/Thre-ad/Alb-um"));
    }

    #[test]
    fn test_album_path_traversal_segments_neutralized() {
        let path = album_path(Path::new("/out"), "../secret");
        assert!(path.starts_with("/out"), "got {}", path.display());
        assert!(
            !path
                .components()
                .any(|c| c == std::path::Component::ParentDir),
            "got {}",
            path.display()
        );
    }

    #[test]
    fn test_album_path_empty_segments_dropped() {
        let path = album_path(Path::new("/out"), "a//b");
        assert_eq!(path, Path::new("/out/a/b"));
    }

    // ==================== Content-Disposition Tests ====================

    #[test]
    fn test_parse_content_disposition_quoted() {
        let header = r#"attachment; filename="example.mp4""#;
        assert_eq!(
            parse_content_disposition(header),
            Some("example.mp4".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_unquoted() {
        let header = "attachment; filename=example.mp4";
        assert_eq!(
            parse_content_disposition(header),
            Some("example.mp4".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_rfc5987() {
        let header = "attachment; filename*=UTF-8''example%20clip.mp4";
        assert_eq!(
            parse_content_disposition(header),
            Some("example clip.mp4".to_string())
        );
    }

    #[test]
    fn test_parse_content_disposition_missing() {
        assert_eq!(parse_content_disposition("attachment"), None);
    }
}
