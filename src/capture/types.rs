use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::classify::AssetKind;

/// One completed network response, recorded at most once per URL
///
/// `content` is the response body as text, or base64 when `encoding` says
/// so; `None` means the host could not provide a body, in which case the
/// entry is counted but excluded from the archive.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedRequest {
    pub url: String,
    pub method: String,
    pub status: u16,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub encoding: Option<String>,
}

impl CapturedRequest {
    /// Whether `content` holds base64-encoded bytes rather than text
    pub fn is_base64(&self) -> bool {
        self.encoding.as_deref() == Some("base64")
    }
}

/// Key-by-key dump of a page's local and session storage
///
/// Storage that could not be read (disabled, security error) degrades to
/// empty mappings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSnapshot {
    #[serde(default)]
    pub local: HashMap<String, String>,
    #[serde(default)]
    pub session: HashMap<String, String>,
}

/// Serialized capture of one page: DOM, storage, styles, and links
///
/// Produced by the page snapshot script (or the static serializer for
/// HTTP-backed hosts); field names match the script's return value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    pub url: String,
    #[serde(default)]
    pub title: String,
    pub html: String,
    #[serde(default)]
    pub storage: StorageSnapshot,
    #[serde(default)]
    pub inline_styles: Vec<String>,
    #[serde(default)]
    pub internal_links: Vec<String>,
}

/// Browser cookie as reported by the host
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
}

/// One server-sent-event message drained from the page tap
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamedMessage {
    pub url: String,
    pub data: String,
    #[serde(rename = "type", default = "default_event_type")]
    pub event_type: String,
    /// Milliseconds since the Unix epoch, as reported by the page
    #[serde(default)]
    pub timestamp: u64,
}

fn default_event_type() -> String {
    "message".to_string()
}

/// Running capture totals, one bucket per asset category plus pages/bytes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetTotals {
    pub total: u64,
    pub html: u64,
    pub css: u64,
    pub js: u64,
    pub json: u64,
    pub img: u64,
    pub font: u64,
    pub other: u64,
    pub pages: u64,
    pub bytes: u64,
}

impl AssetTotals {
    /// Counts one accepted request in its category bucket
    pub fn bump(&mut self, kind: AssetKind, size: u64) {
        self.total += 1;
        self.bytes += size;
        match kind {
            AssetKind::Html => self.html += 1,
            AssetKind::Css => self.css += 1,
            AssetKind::Js => self.js += 1,
            AssetKind::Json => self.json += 1,
            AssetKind::Img => self.img += 1,
            AssetKind::Font => self.font += 1,
            AssetKind::Other => self.other += 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals_bump_per_category() {
        let mut totals = AssetTotals::default();
        totals.bump(AssetKind::Css, 120);
        totals.bump(AssetKind::Css, 80);
        totals.bump(AssetKind::Img, 4000);

        assert_eq!(totals.total, 3);
        assert_eq!(totals.css, 2);
        assert_eq!(totals.img, 1);
        assert_eq!(totals.bytes, 4200);
        assert_eq!(totals.pages, 0);
    }

    #[test]
    fn test_snapshot_payload_parses_from_script_shape() {
        let payload = serde_json::json!({
            "url": "https://example.com/",
            "title": "Home",
            "html": "<html><head></head><body></body></html>",
            "storage": { "local": {"k": "v"}, "session": {} },
            "inlineStyles": ["body { margin: 0 }"],
            "internalLinks": ["https://example.com/about"]
        });
        let snapshot: PageSnapshot = serde_json::from_value(payload).unwrap();
        assert_eq!(snapshot.title, "Home");
        assert_eq!(snapshot.storage.local.get("k").map(String::as_str), Some("v"));
        assert_eq!(snapshot.internal_links.len(), 1);
    }

    #[test]
    fn test_snapshot_tolerates_missing_optional_fields() {
        let payload = serde_json::json!({
            "url": "https://example.com/",
            "html": "<html></html>"
        });
        let snapshot: PageSnapshot = serde_json::from_value(payload).unwrap();
        assert!(snapshot.title.is_empty());
        assert!(snapshot.inline_styles.is_empty());
        assert!(snapshot.storage.local.is_empty());
    }

    #[test]
    fn test_streamed_message_renames_type_field() {
        let payload = serde_json::json!({
            "url": "https://example.com/events",
            "data": "{\"tick\":1}",
            "type": "message",
            "timestamp": 1724300000000_u64
        });
        let msg: StreamedMessage = serde_json::from_value(payload).unwrap();
        assert_eq!(msg.event_type, "message");
        assert_eq!(msg.timestamp, 1724300000000);
    }
}
