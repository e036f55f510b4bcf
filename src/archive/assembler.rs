//! ZIP bundle construction
//!
//! Entry layout: a root `index.html` redirect, `pages/` with one rewritten
//! document per snapshot, per-category `assets/` folders, the runtime layer
//! (mock handler, mock dataset, combined styles), `network/` session dumps,
//! `sitemap.xml`, `robots.txt`, and a `__manifest.json` describing what the
//! archive contains.

use std::collections::BTreeMap;
use std::io::{Cursor, Write};

use base64::Engine as _;
use chrono::Utc;
use url::Url;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::capture::{AssetKind, CaptureStore, StorageSnapshot};
use crate::url::page_slug;

use super::paths::AssetMap;
use super::rewrite::Rewriter;
use super::runtime::{
    combined_styles, COMBINED_STYLES_PATH, MOCK_DATA_PATH, MOCK_HANDLER_JS, MOCK_HANDLER_PATH,
};
use super::{ArchiveError, ArchiveResult};

/// Entries always present in an archive, independent of capture volume
const FIXED_ENTRIES: usize = 8;

/// Counts describing a finished archive
#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    pub pages: usize,
    pub assets: usize,
    pub api_mocks: usize,
    pub streamed_messages: usize,
    /// Compressed size of the whole bundle
    pub bytes: usize,
}

/// A finished archive: the ZIP bytes plus its content summary
pub struct ArchiveBundle {
    pub bytes: Vec<u8>,
    pub summary: ArchiveSummary,
}

/// Builds offline ZIP bundles from a capture store
pub struct Assembler {
    entry: Url,
    strip_analytics: bool,
}

impl Assembler {
    /// # Arguments
    ///
    /// * `entry` - Normalized URL the root redirect should land on
    /// * `strip_analytics` - Replace analytics script tags in page HTML
    pub fn new(entry: Url, strip_analytics: bool) -> Self {
        Assembler {
            entry,
            strip_analytics,
        }
    }

    /// Assembles the archive without progress reporting
    pub fn assemble(&self, store: &CaptureStore) -> ArchiveResult<ArchiveBundle> {
        self.assemble_with_progress(store, |_| {})
    }

    /// Assembles the archive, reporting completion as a 0-100 percentage
    ///
    /// The percentage counts archive entries written, so it advances
    /// smoothly through the page and asset loops.
    pub fn assemble_with_progress(
        &self,
        store: &CaptureStore,
        mut progress: impl FnMut(u8),
    ) -> ArchiveResult<ArchiveBundle> {
        if store.is_empty() {
            return Err(ArchiveError::EmptyStore);
        }

        let map = AssetMap::build(store.requests());
        let rewriter = Rewriter::new(&map)?;

        tracing::info!(
            pages = store.pages().len(),
            requests = store.requests().len(),
            mocks = map.mock_bodies().len(),
            "assembling archive"
        );
        if store.pages().is_empty() {
            tracing::warn!("no page snapshots captured; the root redirect will dangle");
        }

        let total_entries = FIXED_ENTRIES
            + store.pages().len()
            + store.requests().len()
            + usize::from(!store.streamed().is_empty());
        let mut written = 0usize;

        let entry_slug = self.entry_slug(store);
        let mut assets_written = 0usize;

        let mut buffer = Vec::new();
        {
            let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
            let options = SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated);

            // runtime layer: handler, dataset, combined styles
            zip.start_file(MOCK_HANDLER_PATH, options)?;
            zip.write_all(MOCK_HANDLER_JS.as_bytes())?;
            written += 1;
            progress(percent(written, total_entries));

            zip.start_file(MOCK_DATA_PATH, options)?;
            zip.write_all(serde_json::to_string_pretty(map.mock_bodies())?.as_bytes())?;
            written += 1;
            progress(percent(written, total_entries));

            zip.start_file(COMBINED_STYLES_PATH, options)?;
            zip.write_all(combined_styles(store.pages().values()).as_bytes())?;
            written += 1;
            progress(percent(written, total_entries));

            // one rewritten document per snapshot
            for (url_str, snapshot) in store.pages() {
                written += 1;
                let slug = match Url::parse(url_str) {
                    Ok(url) => page_slug(&url),
                    Err(e) => {
                        tracing::warn!(url = %url_str, error = %e, "unaddressable page key");
                        progress(percent(written, total_entries));
                        continue;
                    }
                };

                let mut html = rewriter.rewrite_page_html(&snapshot.html);
                if self.strip_analytics {
                    html = rewriter.strip_analytics_scripts(&html);
                }
                html = rewriter.inject_head_links(&html);

                zip.start_file(format!("pages/{}.html", slug), options)?;
                zip.write_all(html.as_bytes())?;
                tracing::debug!(url = %url_str, slug = %slug, "archived page");
                progress(percent(written, total_entries));
            }

            // root redirect into the entry page
            zip.start_file("index.html", options)?;
            zip.write_all(root_redirect(&entry_slug).as_bytes())?;
            written += 1;
            progress(percent(written, total_entries));

            // captured assets; entries without a body are counted but skipped
            for request in store.requests() {
                written += 1;
                let Some(asset) = map.get(&request.url) else {
                    progress(percent(written, total_entries));
                    continue;
                };
                let Some(content) = request.content.as_deref() else {
                    tracing::trace!(url = %request.url, "no body captured; skipping");
                    progress(percent(written, total_entries));
                    continue;
                };

                let bytes = match asset_bytes(&rewriter, asset.kind, content, request.is_base64())
                {
                    Some(bytes) => bytes,
                    None => {
                        tracing::warn!(url = %request.url, "undecodable body; skipping");
                        progress(percent(written, total_entries));
                        continue;
                    }
                };

                zip.start_file(asset.local_path.clone(), options)?;
                zip.write_all(&bytes)?;
                assets_written += 1;
                progress(percent(written, total_entries));
            }

            // per-page storage plus session cookies
            let storage: BTreeMap<&str, &StorageSnapshot> = store
                .pages()
                .iter()
                .map(|(url, snapshot)| (url.as_str(), &snapshot.storage))
                .collect();
            let state = serde_json::json!({
                "storage": storage,
                "cookies": store.cookies(),
                "timestamp": Utc::now().to_rfc3339(),
            });
            zip.start_file("network/storage_and_state.json", options)?;
            zip.write_all(serde_json::to_string_pretty(&state)?.as_bytes())?;
            written += 1;
            progress(percent(written, total_entries));

            zip.start_file("sitemap.xml", options)?;
            zip.write_all(sitemap(store).as_bytes())?;
            written += 1;
            progress(percent(written, total_entries));

            zip.start_file("robots.txt", options)?;
            zip.write_all(b"User-agent: *\nDisallow:\n\nSitemap: sitemap.xml\n")?;
            written += 1;
            progress(percent(written, total_entries));

            if !store.streamed().is_empty() {
                zip.start_file("network/sse-messages.json", options)?;
                zip.write_all(serde_json::to_string_pretty(store.streamed())?.as_bytes())?;
                written += 1;
                progress(percent(written, total_entries));
            }

            let manifest = self.manifest(store, &map, &entry_slug, assets_written);
            zip.start_file("__manifest.json", options)?;
            zip.write_all(serde_json::to_string_pretty(&manifest)?.as_bytes())?;
            written += 1;
            progress(percent(written, total_entries));

            zip.finish()?;
        }

        let summary = ArchiveSummary {
            pages: store.pages().len(),
            assets: assets_written,
            api_mocks: map.mock_bodies().len(),
            streamed_messages: store.streamed().len(),
            bytes: buffer.len(),
        };
        tracing::info!(
            pages = summary.pages,
            assets = summary.assets,
            mocks = summary.api_mocks,
            bytes = summary.bytes,
            "archive assembled"
        );

        Ok(ArchiveBundle {
            bytes: buffer,
            summary,
        })
    }

    /// Slug the root redirect targets: the entry page when captured,
    /// otherwise the first page in the store
    fn entry_slug(&self, store: &CaptureStore) -> String {
        if store.pages().contains_key(self.entry.as_str()) {
            return page_slug(&self.entry);
        }
        store
            .pages()
            .keys()
            .next()
            .and_then(|key| Url::parse(key).ok())
            .map(|url| page_slug(&url))
            .unwrap_or_else(|| "index".to_string())
    }

    fn manifest(
        &self,
        store: &CaptureStore,
        map: &AssetMap,
        entry_slug: &str,
        assets_written: usize,
    ) -> serde_json::Value {
        let has_shadow_dom = store
            .pages()
            .values()
            .any(|page| page.html.contains("shadowrootmode"));
        let has_canvas_captures = store
            .pages()
            .values()
            .any(|page| page.html.contains("data-canvas-capture"));

        serde_json::json!({
            "generator": "utsushi",
            "version": env!("CARGO_PKG_VERSION"),
            "generatedAt": Utc::now().to_rfc3339(),
            "source": self.entry.as_str(),
            "entry": format!("pages/{}.html", entry_slug),
            "pages": store.pages().len(),
            "assets": assets_written,
            "apiMocks": map.mock_bodies().len(),
            "sseMessages": store.streamed().len(),
            "hasShadowDom": has_shadow_dom,
            "hasCanvasCaptures": has_canvas_captures,
        })
    }
}

/// Decodes and, for stylesheets, rewrites one asset body
///
/// `None` means the body could not be decoded and the asset is skipped.
fn asset_bytes(
    rewriter: &Rewriter,
    kind: AssetKind,
    content: &str,
    is_base64: bool,
) -> Option<Vec<u8>> {
    if kind == AssetKind::Css {
        // stylesheets get URL rewriting, so decode to text first
        let text = if is_base64 {
            let raw = base64::engine::general_purpose::STANDARD
                .decode(content)
                .ok()?;
            String::from_utf8(raw).ok()?
        } else {
            content.to_string()
        };
        return Some(rewriter.rewrite_stylesheet(&text).into_bytes());
    }

    if is_base64 {
        base64::engine::general_purpose::STANDARD
            .decode(content)
            .ok()
    } else {
        Some(content.as_bytes().to_vec())
    }
}

fn root_redirect(entry_slug: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><meta http-equiv=\"refresh\" content=\"0; url=pages/{slug}.html\"></head>\n<body><p>Loading <a href=\"pages/{slug}.html\">the archived site</a>...</p></body>\n</html>\n",
        slug = entry_slug
    )
}

fn sitemap(store: &CaptureStore) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );
    for url in store.pages().keys() {
        xml.push_str("  <url><loc>");
        xml.push_str(url);
        xml.push_str("</loc></url>\n");
    }
    xml.push_str("</urlset>\n");
    xml
}

fn percent(written: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((written * 100) / total).min(100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CapturedRequest, PageSnapshot};

    fn seed() -> Url {
        Url::parse("https://example.com/").unwrap()
    }

    fn small_store() -> CaptureStore {
        let mut store = CaptureStore::new(&seed(), false);
        store.record_request(CapturedRequest {
            url: "https://example.com/app.css".to_string(),
            method: "GET".to_string(),
            status: 200,
            mime_type: "text/css".to_string(),
            size: 20,
            content: Some("body { margin: 0 }".to_string()),
            encoding: None,
        });
        store.record_page(
            PageSnapshot {
                url: "https://example.com/".to_string(),
                title: "Home".to_string(),
                html: "<html><head></head><body></body></html>".to_string(),
                storage: Default::default(),
                inline_styles: vec![],
                internal_links: vec![],
            },
            vec![],
        );
        store
    }

    #[test]
    fn test_empty_store_is_rejected() {
        let store = CaptureStore::new(&seed(), false);
        let result = Assembler::new(seed(), true).assemble(&store);
        assert!(matches!(result, Err(ArchiveError::EmptyStore)));
    }

    #[test]
    fn test_progress_is_monotonic_and_completes() {
        let store = small_store();
        let mut seen = Vec::new();
        Assembler::new(seed(), true)
            .assemble_with_progress(&store, |pct| seen.push(pct))
            .unwrap();

        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "progress regressed: {:?}", seen);
        assert_eq!(*seen.last().unwrap(), 100);
    }

    #[test]
    fn test_entry_slug_falls_back_to_first_page() {
        let mut store = CaptureStore::new(&seed(), false);
        store.record_page(
            PageSnapshot {
                url: "https://example.com/only-page".to_string(),
                title: String::new(),
                html: "<html></html>".to_string(),
                storage: Default::default(),
                inline_styles: vec![],
                internal_links: vec![],
            },
            vec![],
        );

        let assembler = Assembler::new(seed(), true);
        assert_eq!(assembler.entry_slug(&store), "only-page");
    }

    #[test]
    fn test_summary_counts_compressed_output() {
        let store = small_store();
        let bundle = Assembler::new(seed(), true).assemble(&store).unwrap();

        assert_eq!(bundle.summary.pages, 1);
        assert_eq!(bundle.summary.assets, 1);
        assert_eq!(bundle.summary.api_mocks, 0);
        assert_eq!(bundle.summary.bytes, bundle.bytes.len());
        assert!(!bundle.bytes.is_empty());
    }
}
