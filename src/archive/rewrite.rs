//! URL substitution and HTML surgery for archived pages
//!
//! All captured URLs are folded into one alternation pattern sorted
//! longest-first, so `https://x/a/b` always wins over `https://x/a` when
//! both were captured. Replacement targets are computed relative to the
//! directory the rewritten file lives in: page documents sit in `pages/`,
//! stylesheets in `assets/css/`.

use std::collections::HashMap;

use regex::Regex;

use super::paths::AssetMap;
use super::runtime::{COMBINED_STYLES_PATH, MOCK_HANDLER_PATH};
use super::ArchiveResult;

/// Script tags whose source points at a known analytics vendor
const ANALYTICS_SCRIPT_PATTERN: &str =
    r#"(?i)<script[^>]*src="[^"]*(?:analytics|googletagmanager|hubspot)[^"]*"[^>]*></script>"#;

/// Rewrites captured URLs (and page chrome) to archive-local form
pub struct Rewriter {
    /// Alternation over every captured URL, longest first; `None` when
    /// nothing was captured
    pattern: Option<Regex>,
    targets: HashMap<String, String>,
    analytics: Regex,
    head_open: Regex,
    head_close: Regex,
}

impl Rewriter {
    pub fn new(map: &AssetMap) -> ArchiveResult<Self> {
        let mut urls: Vec<&str> = map.urls().collect();
        // longest first so overlapping prefixes pick the longer capture;
        // ties break lexicographically to keep the pattern deterministic
        urls.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let pattern = if urls.is_empty() {
            None
        } else {
            let escaped: Vec<String> = urls.iter().map(|url| regex::escape(url)).collect();
            Some(Regex::new(&escaped.join("|"))?)
        };

        let targets = map
            .iter()
            .map(|(url, asset)| (url.to_string(), asset.local_path.clone()))
            .collect();

        Ok(Rewriter {
            pattern,
            targets,
            analytics: Regex::new(ANALYTICS_SCRIPT_PATTERN)?,
            head_open: Regex::new(r"(?i)<head>")?,
            head_close: Regex::new(r"(?i)</head>")?,
        })
    }

    /// Replaces captured URLs with paths relative to `pages/`
    ///
    /// Page documents live one level below the archive root, so assets
    /// gain a `../` prefix while links to other archived pages stay
    /// sibling-relative.
    pub fn rewrite_page_html(&self, html: &str) -> String {
        self.replace_all(html, |local| match local.strip_prefix("pages/") {
            Some(sibling) => sibling.to_string(),
            None => format!("../{}", local),
        })
    }

    /// Replaces captured URLs with paths relative to `assets/css/`
    pub fn rewrite_stylesheet(&self, css: &str) -> String {
        self.replace_all(css, |local| match local.strip_prefix("assets/") {
            Some(rest) => format!("../{}", rest),
            None => format!("../../{}", local),
        })
    }

    fn replace_all(&self, text: &str, relative: impl Fn(&str) -> String) -> String {
        let Some(pattern) = &self.pattern else {
            return text.to_string();
        };
        pattern
            .replace_all(text, |caps: &regex::Captures<'_>| {
                let url = &caps[0];
                match self.targets.get(url) {
                    Some(local) => relative(local),
                    None => url.to_string(),
                }
            })
            .into_owned()
    }

    /// Replaces known analytics script tags with a removal comment
    pub fn strip_analytics_scripts(&self, html: &str) -> String {
        self.analytics
            .replace_all(html, "<!-- removed analytics -->")
            .into_owned()
    }

    /// Injects the mock handler script and combined-styles link into the
    /// document head
    ///
    /// The handler goes right after `<head>` so it wraps `fetch` before
    /// any page script runs; the stylesheet link goes last so combined
    /// inline styles keep their cascade position. Documents without a
    /// literal head tag are left untouched.
    pub fn inject_head_links(&self, html: &str) -> String {
        let with_script = self.head_open.replace(
            html,
            format!(
                "<head>\n<script src=\"../{}\"></script>",
                MOCK_HANDLER_PATH
            ),
        );
        self.head_close
            .replace(
                &with_script,
                format!(
                    "<link rel=\"stylesheet\" href=\"../{}\">\n</head>",
                    COMBINED_STYLES_PATH
                ),
            )
            .into_owned()
    }
}
