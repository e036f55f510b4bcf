use crate::UrlError;
use url::Url;

/// Normalizes a URL for link-discovery deduplication
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Reject non-HTTP(S) schemes (`tel:`, `mailto:`, `javascript:`, ...)
/// 3. Remove the fragment (everything after #)
/// 4. Remove the query string — discovery treats `/page?tab=1` and
///    `/page?tab=2` as the same page; captured *requests* keep their query
/// 5. Remove trailing slashes from the path (except for root `/`)
///
/// The host is lowercased and dot segments are resolved by the parser.
/// The result is idempotent: normalizing an already-normalized URL is a
/// no-op.
///
/// # Arguments
///
/// * `url_str` - The URL string to normalize
///
/// # Returns
///
/// * `Ok(Url)` - Normalized URL
/// * `Err(UrlError)` - Failed to parse, or unsupported scheme
///
/// # Examples
///
/// ```
/// use utsushi::url::normalize_url;
///
/// let url = normalize_url("https://example.com/docs/?tab=2#intro").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/docs");
/// ```
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    // Step 1: Parse the URL
    let mut url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    // Step 2: Validate scheme
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    // Steps 3 & 4: Remove fragment and query
    url.set_fragment(None);
    url.set_query(None);

    // Step 5: Remove trailing slashes (root keeps its single slash)
    let path = url.path();
    let trimmed = trim_trailing_slashes(path);
    if trimmed != path {
        let trimmed = trimmed.to_string();
        url.set_path(&trimmed);
    }

    Ok(url)
}

/// Removes trailing slashes from a path, preserving the root path `/`
fn trim_trailing_slashes(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}

/// Checks whether two URLs share an origin (scheme, host, port)
///
/// Default ports are resolved before comparison, so
/// `https://example.com` and `https://example.com:443` match.
pub fn is_same_origin(a: &Url, b: &Url) -> bool {
    a.origin() == b.origin()
}
