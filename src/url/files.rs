use sha2::{Digest, Sha256};
use url::Url;

/// Derives the archive page slug for a URL
///
/// The slug is the URL path with leading/trailing slashes trimmed and the
/// remaining separators flattened to `__`, so `/docs/getting-started`
/// becomes `docs__getting-started.html` under `pages/`. The root path maps
/// to `index`. Characters outside `[a-zA-Z0-9._-]` are replaced with `_`.
pub fn page_slug(url: &Url) -> String {
    let trimmed = url.path().trim_matches('/');
    if trimmed.is_empty() {
        return "index".to_string();
    }
    trimmed
        .replace('/', "__")
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Extracts a filesystem-safe stem from the last path segment of a URL
///
/// Falls back to `index` when the path has no final segment (root, or a
/// path ending in `/`).
pub fn file_stem(url: &Url) -> String {
    let segment = url
        .path_segments()
        .and_then(|segments| segments.last())
        .unwrap_or("");
    if segment.is_empty() {
        return "index".to_string();
    }
    segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// SHA-256 hex digest of the full URL string
///
/// Archive filenames embed a prefix of this digest so that same-named
/// assets from different paths never collide.
pub fn url_hash(url: &Url) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_str().as_bytes());
    hex::encode(hasher.finalize())
}

/// Extension of the last path segment, lowercased
///
/// Returns `None` unless the segment has a dot followed by 1–8
/// alphanumeric characters, so extensionless routes like `/about` and
/// versioned paths like `/v1.2/data` don't produce junk extensions.
pub fn extension_from_path(url: &Url) -> Option<String> {
    let segment = url.path_segments().and_then(|segments| segments.last())?;
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 8 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
