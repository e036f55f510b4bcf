//! Resource classification
//!
//! Maps a (MIME type, URL) pair to an asset category. The same function
//! drives both the live capture counters and archive folder placement, so
//! it must stay pure and total: any input maps to exactly one category,
//! and the same input always maps to the same category.

/// Asset category assigned to every captured resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Html,
    Css,
    Js,
    Json,
    Img,
    Font,
    Other,
}

impl AssetKind {
    /// Short lowercase label used in logs and counters
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetKind::Html => "html",
            AssetKind::Css => "css",
            AssetKind::Js => "js",
            AssetKind::Json => "json",
            AssetKind::Img => "img",
            AssetKind::Font => "font",
            AssetKind::Other => "other",
        }
    }

    /// Archive folder this category is placed under
    pub fn folder(&self) -> &'static str {
        match self {
            AssetKind::Html => "pages",
            AssetKind::Css => "assets/css",
            AssetKind::Js => "assets/js",
            AssetKind::Json => "assets/data",
            AssetKind::Img => "assets/images",
            AssetKind::Font => "assets/fonts",
            AssetKind::Other => "assets/misc",
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classifies a resource by MIME type with a URL-extension fallback
///
/// Precedence: MIME substring match (html > css > js/ecmascript > json >
/// `image/` prefix > font substring), then font detection by URL extension
/// for servers that send fonts as `application/octet-stream`.
pub fn classify(mime: &str, url: &str) -> AssetKind {
    if mime.contains("html") {
        return AssetKind::Html;
    }
    if mime.contains("css") {
        return AssetKind::Css;
    }
    if mime.contains("javascript") || mime.contains("ecmascript") {
        return AssetKind::Js;
    }
    if mime.contains("json") {
        return AssetKind::Json;
    }
    if mime.starts_with("image/") {
        return AssetKind::Img;
    }
    if mime.contains("font") || has_extension(url, &["woff2", "woff", "ttf", "otf", "eot"]) {
        return AssetKind::Font;
    }
    AssetKind::Other
}

/// Skip policy applied before a request is recorded
///
/// Rejects large binary/media downloads, analytics beacons, and anything
/// that is not plain HTTP(S).
pub fn should_skip_url(url: &str) -> bool {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return true;
    }
    if url.contains("google-analytics") {
        return true;
    }
    has_extension(url, &["pdf", "zip", "exe", "dmg", "mp4", "mp3"])
}

/// True when the URL path ends in `.<ext>` for any of `exts`, ignoring
/// query string and fragment, case-insensitive
fn has_extension(url: &str, exts: &[&str]) -> bool {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let path = url[..end].to_ascii_lowercase();
    exts.iter()
        .any(|ext| path.len() > ext.len() + 1 && path.ends_with(&format!(".{}", ext)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_precedence() {
        assert_eq!(classify("text/html; charset=utf-8", ""), AssetKind::Html);
        assert_eq!(classify("text/css", ""), AssetKind::Css);
        assert_eq!(classify("application/javascript", ""), AssetKind::Js);
        assert_eq!(classify("text/ecmascript", ""), AssetKind::Js);
        assert_eq!(classify("application/json", ""), AssetKind::Json);
        assert_eq!(classify("image/png", ""), AssetKind::Img);
        assert_eq!(classify("font/woff2", ""), AssetKind::Font);
        assert_eq!(classify("application/octet-stream", ""), AssetKind::Other);
    }

    #[test]
    fn test_html_beats_other_substrings() {
        // "application/xhtml+xml" contains both "html" and would otherwise
        // fall through; html wins by precedence
        assert_eq!(classify("application/xhtml+xml", ""), AssetKind::Html);
    }

    #[test]
    fn test_font_by_extension_with_empty_mime() {
        assert_eq!(
            classify("", "https://cdn.example.com/fonts/inter.woff2"),
            AssetKind::Font
        );
        assert_eq!(
            classify("", "https://cdn.example.com/fonts/inter.woff2?v=4"),
            AssetKind::Font
        );
        assert_eq!(
            classify("application/octet-stream", "https://x/f.ttf"),
            AssetKind::Font
        );
    }

    #[test]
    fn test_classification_is_deterministic() {
        let inputs = [
            ("text/html", "https://x/"),
            ("", "https://x/font.eot"),
            ("image/svg+xml", "https://x/logo.svg"),
            ("", "https://x/nothing"),
        ];
        for (mime, url) in inputs {
            assert_eq!(classify(mime, url), classify(mime, url));
        }
    }

    #[test]
    fn test_skip_binary_extensions() {
        assert!(should_skip_url("https://example.com/report.pdf"));
        assert!(should_skip_url("https://example.com/bundle.zip?dl=1"));
        assert!(should_skip_url("https://example.com/video.MP4"));
        assert!(!should_skip_url("https://example.com/app.js"));
    }

    #[test]
    fn test_skip_analytics() {
        assert!(should_skip_url(
            "https://www.google-analytics.com/collect?v=1"
        ));
    }

    #[test]
    fn test_skip_non_http_schemes() {
        assert!(should_skip_url("tel:+15551234567"));
        assert!(should_skip_url("mailto:hi@example.com"));
        assert!(should_skip_url("data:image/png;base64,AAAA"));
        assert!(should_skip_url("chrome-extension://abc/panel.html"));
    }

    #[test]
    fn test_extension_requires_separator_dot() {
        // "zip" appearing as the whole last segment is not an extension
        assert!(!should_skip_url("https://example.com/zip"));
        assert!(!should_skip_url("https://example.com/download/pdf-guide"));
    }

    #[test]
    fn test_folder_mapping() {
        assert_eq!(AssetKind::Html.folder(), "pages");
        assert_eq!(AssetKind::Css.folder(), "assets/css");
        assert_eq!(AssetKind::Js.folder(), "assets/js");
        assert_eq!(AssetKind::Json.folder(), "assets/data");
        assert_eq!(AssetKind::Img.folder(), "assets/images");
        assert_eq!(AssetKind::Font.folder(), "assets/fonts");
        assert_eq!(AssetKind::Other.folder(), "assets/misc");
    }
}
