//! DOM serialization for static documents
//!
//! Mirror of the in-page snapshot contract for hosts that work from
//! fetched HTML instead of a live DOM: text nodes emit literally (entity
//! decoding included), comments round-trip, attribute values escape
//! embedded quotes, void elements never close, and canvas elements — which
//! have no pixel content without a renderer — degrade to the placeholder
//! comment the contract prescribes for failed exports.

use ego_tree::NodeRef;
use scraper::node::Node;
use scraper::{Html, Selector};
use url::Url;

use crate::capture::{PageSnapshot, StorageSnapshot};
use crate::host::HostError;
use crate::url::is_same_origin;

/// Elements that never take children or a closing tag
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Serializes a parsed document from its root `<html>` element
pub fn serialize_document(document: &Html) -> String {
    let mut out = String::new();
    serialize_node(*document.root_element(), &mut out);
    out
}

fn serialize_node(node: NodeRef<'_, Node>, out: &mut String) {
    match node.value() {
        Node::Text(text) => out.push_str(text),
        Node::Comment(comment) => {
            out.push_str("<!--");
            out.push_str(comment);
            out.push_str("-->");
        }
        Node::Element(element) => {
            let tag = element.name();

            // No renderer, no pixels: static canvas export always fails
            if tag == "canvas" {
                out.push_str("<!-- canvas capture failed -->");
                return;
            }

            out.push('<');
            out.push_str(tag);
            for (name, value) in element.attrs() {
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                out.push_str(&value.replace('"', "&quot;"));
                out.push('"');
            }
            out.push('>');

            if VOID_ELEMENTS.contains(&tag) {
                return;
            }
            for child in node.children() {
                serialize_node(child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
        _ => {}
    }
}

/// Builds a full snapshot payload from fetched HTML
///
/// Storage mappings are empty (a plain HTTP fetch sees no page storage);
/// internal links are `a[href]` targets resolved against `url` and kept
/// only when they share its origin.
pub fn snapshot_from_document(html: &str, url: &Url) -> PageSnapshot {
    let document = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|selector| {
            document
                .select(&selector)
                .next()
                .map(|element| element.text().collect::<String>().trim().to_string())
        })
        .unwrap_or_default();

    let inline_styles = match Selector::parse("style") {
        Ok(selector) => document
            .select(&selector)
            .map(|element| element.text().collect::<String>())
            .collect(),
        Err(_) => Vec::new(),
    };

    let mut internal_links = Vec::new();
    if let Ok(selector) = Selector::parse("a[href]") {
        for element in document.select(&selector) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Ok(resolved) = url.join(href) else {
                continue;
            };
            if (resolved.scheme() == "http" || resolved.scheme() == "https")
                && is_same_origin(&resolved, url)
            {
                internal_links.push(resolved.to_string());
            }
        }
    }

    PageSnapshot {
        url: url.to_string(),
        title,
        html: serialize_document(&document),
        storage: StorageSnapshot::default(),
        inline_styles,
        internal_links,
    }
}

/// Parses the structured result of the in-page snapshot script
pub fn parse_snapshot_payload(value: serde_json::Value) -> Result<PageSnapshot, HostError> {
    if value.is_null() {
        return Err(HostError::Script(
            "snapshot script returned no result".to_string(),
        ));
    }
    serde_json::from_value(value)
        .map_err(|e| HostError::Script(format!("snapshot payload malformed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/").unwrap()
    }

    #[test]
    fn test_round_trips_simple_document() {
        let input =
            "<html><head><title>T</title></head><body><p class=\"a\">hi</p><!--note--></body></html>";
        let document = Html::parse_document(input);
        assert_eq!(serialize_document(&document), input);
    }

    #[test]
    fn test_void_elements_never_close() {
        let input = "<html><head></head><body><br><img src=\"x.png\"></body></html>";
        let document = Html::parse_document(input);
        let out = serialize_document(&document);
        assert_eq!(out, input);
        assert!(!out.contains("</br>"));
        assert!(!out.contains("</img>"));
    }

    #[test]
    fn test_attribute_quotes_are_escaped() {
        let input = "<html><head></head><body><div data-x='say \"hi\"'></div></body></html>";
        let document = Html::parse_document(input);
        let out = serialize_document(&document);
        assert!(out.contains("data-x=\"say &quot;hi&quot;\""));
    }

    #[test]
    fn test_text_emits_decoded_entities_literally() {
        let input = "<html><head></head><body><p>a &amp; b</p></body></html>";
        let document = Html::parse_document(input);
        assert_eq!(
            serialize_document(&document),
            "<html><head></head><body><p>a & b</p></body></html>"
        );
    }

    #[test]
    fn test_canvas_degrades_to_placeholder_comment() {
        let input = "<html><head></head><body><canvas id=\"chart\" width=\"10\"></canvas></body></html>";
        let document = Html::parse_document(input);
        let out = serialize_document(&document);
        assert!(out.contains("<!-- canvas capture failed -->"));
        assert!(!out.contains("<canvas"));
    }

    #[test]
    fn test_snapshot_collects_title_styles_links() {
        let html = r#"<html><head><title> Home </title><style>body { margin: 0 }</style></head>
<body>
<a href="/about">About</a>
<a href="https://example.com/docs/">Docs</a>
<a href="https://elsewhere.net/x">Out</a>
<a href="mailto:hi@example.com">Mail</a>
</body></html>"#;
        let snapshot = snapshot_from_document(html, &base());

        assert_eq!(snapshot.title, "Home");
        assert_eq!(snapshot.inline_styles, vec!["body { margin: 0 }"]);
        assert_eq!(
            snapshot.internal_links,
            vec![
                "https://example.com/about".to_string(),
                "https://example.com/docs/".to_string(),
            ]
        );
        assert!(snapshot.storage.local.is_empty());
    }

    #[test]
    fn test_parse_payload_rejects_null() {
        let err = parse_snapshot_payload(serde_json::Value::Null).unwrap_err();
        assert!(matches!(err, HostError::Script(_)));
    }

    #[test]
    fn test_parse_payload_accepts_script_shape() {
        let value = serde_json::json!({
            "url": "https://example.com/",
            "title": "x",
            "html": "<html></html>",
            "storage": {"local": {}, "session": {}},
            "inlineStyles": [],
            "internalLinks": []
        });
        let snapshot = parse_snapshot_payload(value).unwrap();
        assert_eq!(snapshot.url, "https://example.com/");
    }
}
