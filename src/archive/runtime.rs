//! Scripts and synthesized files embedded in every archive

use std::collections::HashSet;

use crate::capture::PageSnapshot;

/// Archive path of the offline API mock handler
pub const MOCK_HANDLER_PATH: &str = "assets/js/_mock_handler.js";

/// Archive path of the deduplicated inline-style bundle
pub const COMBINED_STYLES_PATH: &str = "assets/css/_inline-styles-combined.css";

/// Archive path of the captured API response dataset
pub const MOCK_DATA_PATH: &str = "assets/data/mock-api-data.json";

/// Separator between two concatenated inline style blocks
const STYLE_BLOCK_SEPARATOR: &str = "\n\n/* next block */\n\n";

/// Offline API mock layer injected into every archived page
///
/// Wraps `window.fetch` and subclasses `XMLHttpRequest` instead of mutating
/// their prototypes, so pages keep working against pristine built-ins.
/// Lookup order: exact URL, then query-stripped URL, then substring
/// containment either way. Misses fall through to the real implementations
/// and fail offline, which is the honest answer for traffic that was never
/// captured.
pub const MOCK_HANDLER_JS: &str = r#"// Offline API mock layer.
// Answers fetch/XHR calls from the captured response dataset; anything not
// in the dataset falls through to the real network stack.
(function () {
  'use strict';

  let dataset = {};
  let loaded = false;
  const realFetch = window.fetch.bind(window);
  const ready = realFetch('../assets/data/mock-api-data.json')
    .then(function (r) { return r.ok ? r.json() : {}; })
    .then(function (d) { dataset = d || {}; loaded = true; })
    .catch(function () { dataset = {}; loaded = true; });

  function lookup(url) {
    if (!url) return null;
    let absolute;
    try {
      absolute = new URL(url, window.location.href).href;
    } catch (e) {
      absolute = String(url);
    }
    if (Object.prototype.hasOwnProperty.call(dataset, absolute)) return dataset[absolute];
    if (Object.prototype.hasOwnProperty.call(dataset, url)) return dataset[url];
    const bare = absolute.split('?')[0];
    for (const key of Object.keys(dataset)) {
      if (key.split('?')[0] === bare) return dataset[key];
      if (key.indexOf(url) !== -1 || absolute.indexOf(key) !== -1) return dataset[key];
    }
    return null;
  }

  window.fetch = function (input, init) {
    const url = typeof input === 'string' ? input : input && input.url;
    return ready.then(function () {
      const body = lookup(url);
      if (body !== null && body !== undefined) {
        return new Response(body, {
          status: 200,
          headers: { 'Content-Type': 'application/json' }
        });
      }
      return realFetch(input, init);
    });
  };

  const RealXHR = window.XMLHttpRequest;
  class MockXMLHttpRequest extends RealXHR {
    open(method, url) {
      this._mockUrl = url;
      super.open.apply(this, arguments);
    }
    send(body) {
      // dataset loads asynchronously; early requests fall through
      const mock = loaded ? lookup(this._mockUrl) : null;
      if (mock === null || mock === undefined) {
        super.send(body);
        return;
      }
      const self = this;
      Object.defineProperty(this, 'readyState', { value: 4 });
      Object.defineProperty(this, 'status', { value: 200 });
      Object.defineProperty(this, 'responseText', { value: mock });
      Object.defineProperty(this, 'response', { value: mock });
      setTimeout(function () {
        self.dispatchEvent(new Event('readystatechange'));
        self.dispatchEvent(new Event('load'));
        self.dispatchEvent(new Event('loadend'));
      }, 0);
    }
  }
  window.XMLHttpRequest = MockXMLHttpRequest;
})();
"#;

/// Concatenates every page's inline style blocks into one stylesheet
///
/// Blocks are deduplicated by trimmed content in first-seen order, since
/// templated sites repeat the same `<style>` payload on every page.
pub fn combined_styles<'a>(pages: impl Iterator<Item = &'a PageSnapshot>) -> String {
    let mut seen = HashSet::new();
    let mut blocks = Vec::new();
    for page in pages {
        for block in &page.inline_styles {
            let trimmed = block.trim();
            if trimmed.is_empty() {
                continue;
            }
            if seen.insert(trimmed.to_string()) {
                blocks.push(trimmed.to_string());
            }
        }
    }
    blocks.join(STYLE_BLOCK_SEPARATOR)
}
