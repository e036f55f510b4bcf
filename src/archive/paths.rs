//! URL to archive-local path mapping
//!
//! Every captured request gets exactly one path inside the archive, placed
//! in its category folder with a filename built from the URL's last path
//! segment plus a short digest prefix. The digest keeps same-named assets
//! from different paths apart, so the mapping is injective: distinct URLs
//! never share a local path.

use std::collections::{BTreeMap, HashMap, HashSet};

use base64::Engine as _;
use url::Url;

use crate::capture::{classify, AssetKind, CapturedRequest};
use crate::url::{extension_from_path, file_stem, url_hash};

/// Longest filename stem kept before the digest suffix
const MAX_STEM_LEN: usize = 50;

/// Digest prefix lengths tried until the candidate path is free
const HASH_PREFIX_LENS: [usize; 5] = [8, 12, 16, 32, 64];

/// Where one captured URL lives inside the archive
#[derive(Debug, Clone)]
pub struct MappedAsset {
    /// Path relative to the archive root, e.g. `assets/js/app_1f3a92bc.js`
    pub local_path: String,
    pub kind: AssetKind,
}

/// The complete URL-to-local-path mapping for one archive
///
/// JSON responses are additionally collected into the mock dataset so the
/// injected handler can answer API calls offline.
#[derive(Debug, Default)]
pub struct AssetMap {
    entries: HashMap<String, MappedAsset>,
    mock_bodies: BTreeMap<String, String>,
}

impl AssetMap {
    /// Maps every captured request to a local archive path
    ///
    /// Requests whose recorded URL no longer parses are dropped with a
    /// warning rather than failing the whole archive.
    pub fn build(requests: &[CapturedRequest]) -> Self {
        let mut entries = HashMap::new();
        let mut mock_bodies = BTreeMap::new();
        let mut taken = HashSet::new();

        for request in requests {
            let url = match Url::parse(&request.url) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!(url = %request.url, error = %e, "unmappable request URL");
                    continue;
                }
            };

            let kind = classify(&request.mime_type, &request.url);
            let local_path = claim_local_path(&url, kind, &mut taken);

            if kind == AssetKind::Json {
                if let Some(body) = text_body(request) {
                    mock_bodies.insert(request.url.clone(), body);
                }
            }

            entries.insert(request.url.clone(), MappedAsset { local_path, kind });
        }

        AssetMap {
            entries,
            mock_bodies,
        }
    }

    pub fn get(&self, url: &str) -> Option<&MappedAsset> {
        self.entries.get(url)
    }

    pub fn local_path(&self, url: &str) -> Option<&str> {
        self.entries.get(url).map(|asset| asset.local_path.as_str())
    }

    /// Captured JSON bodies keyed by their original URL
    pub fn mock_bodies(&self) -> &BTreeMap<String, String> {
        &self.mock_bodies
    }

    pub fn urls(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MappedAsset)> {
        self.entries.iter().map(|(url, asset)| (url.as_str(), asset))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Builds a free local path for `url` and marks it taken
///
/// Starts from an 8-character digest prefix and widens on collision; the
/// final candidate embeds the full URL digest, which is unique because the
/// store never records the same URL twice.
fn claim_local_path(url: &Url, kind: AssetKind, taken: &mut HashSet<String>) -> String {
    let ext = extension_from_path(url).unwrap_or_else(|| default_extension(kind).to_string());

    let mut stem = file_stem(url);
    // "app.min.js" would otherwise become "app.min.js_<hash>.js"
    if let Some(bare) = stem.strip_suffix(&format!(".{}", ext)) {
        if !bare.is_empty() {
            stem = bare.to_string();
        }
    }
    stem.truncate(MAX_STEM_LEN);

    let hash = url_hash(url);
    let mut candidate = String::new();
    for len in HASH_PREFIX_LENS {
        candidate = format!("{}/{}_{}.{}", kind.folder(), stem, &hash[..len], ext);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
    }
    candidate
}

/// Fallback extension when the URL path carries none
fn default_extension(kind: AssetKind) -> &'static str {
    match kind {
        AssetKind::Html => "html",
        AssetKind::Css => "css",
        AssetKind::Js => "js",
        AssetKind::Json => "json",
        AssetKind::Img | AssetKind::Font | AssetKind::Other => "bin",
    }
}

/// Response body as text, decoding the base64 form when necessary
fn text_body(request: &CapturedRequest) -> Option<String> {
    let content = request.content.as_deref()?;
    if request.is_base64() {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(content)
            .ok()?;
        String::from_utf8(bytes).ok()
    } else {
        Some(content.to_string())
    }
}
