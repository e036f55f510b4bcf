//! Page-side scripts evaluated through the host
//!
//! Each script is a self-contained IIFE so repeated evaluation is safe.
//! The snapshot script is the DOM-serialization contract: text nodes
//! emit literally, comments round-trip, canvas exports to a raster
//! `<img>` (placeholder comment when export fails), void elements never
//! close, and shadow roots become declarative `<template>` wrappers.

/// Serializes the live page into a snapshot payload
///
/// Returns `{url, title, html, storage: {local, session}, inlineStyles,
/// internalLinks}`. Storage reads degrade to empty mappings on security
/// errors; internal links are anchor hrefs sharing the page origin.
pub const SNAPSHOT_SCRIPT: &str = r#"(function() {
    const VOID = ["area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track", "wbr"];

    const serializeNode = (node) => {
        if (node.nodeType === Node.TEXT_NODE) return node.textContent;
        if (node.nodeType === Node.COMMENT_NODE) return '<!--' + node.textContent + '-->';
        if (node.nodeType !== Node.ELEMENT_NODE) return "";

        const tag = node.tagName.toLowerCase();

        if (tag === 'canvas') {
            try {
                const dataUrl = node.toDataURL('image/png');
                return '<img src="' + dataUrl + '" style="' + node.style.cssText + '" class="' + node.className + '" data-canvas-capture="true">';
            } catch (e) {
                return '<!-- canvas capture failed -->';
            }
        }

        let str = "<" + tag;
        Array.from(node.attributes).forEach(attr => {
            str += " " + attr.name + '="' + attr.value.replace(/"/g, '&quot;') + '"';
        });
        str += ">";

        if (node.shadowRoot) {
            str += '<template shadowrootmode="' + node.shadowRoot.mode + '">';
            str += Array.from(node.shadowRoot.childNodes).map(serializeNode).join("");
            str += "</template>";
        }

        if (!VOID.includes(tag)) {
            str += Array.from(node.childNodes).map(serializeNode).join("");
            str += "</" + tag + ">";
        }
        return str;
    };

    const serializeDocument = () => {
        const el = document.documentElement;
        let opening = "<html";
        Array.from(el.attributes).forEach(a => opening += ' ' + a.name + '="' + a.value.replace(/"/g, '&quot;') + '"');
        opening += ">";
        return opening + Array.from(el.childNodes).map(serializeNode).join("") + "</html>";
    };

    const getStorage = () => {
        const res = { local: {}, session: {} };
        try {
            for (let i = 0; i < localStorage.length; i++) {
                const k = localStorage.key(i);
                res.local[k] = localStorage.getItem(k);
            }
            for (let i = 0; i < sessionStorage.length; i++) {
                const k = sessionStorage.key(i);
                res.session[k] = sessionStorage.getItem(k);
            }
        } catch (e) {}
        return res;
    };

    return {
        url: window.location.href,
        title: document.title,
        html: serializeDocument(),
        storage: getStorage(),
        inlineStyles: Array.from(document.querySelectorAll('style')).map(s => s.textContent || ''),
        internalLinks: Array.from(document.querySelectorAll('a[href]'))
            .map(a => a.href)
            .filter(h => h.startsWith(window.location.origin))
    };
})()"#;

/// Best-effort fingerprint adjustment for stealth mode
///
/// Masks `navigator.webdriver` and stubs plugin/hardware probes. Purely
/// cosmetic; failures are swallowed in the page.
pub const STEALTH_SCRIPT: &str = r#"(function() {
    if (window.__utsushi_stealth) return true;
    window.__utsushi_stealth = true;
    try {
        Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
        Object.defineProperty(navigator, 'hardwareConcurrency', { get: () => Math.floor(Math.random() * 8) + 4 });
        Object.defineProperty(navigator, 'deviceMemory', { get: () => [4, 8, 16][Math.floor(Math.random() * 3)] });
        if (!navigator.plugins.length) {
            const mockPlugins = [{ name: 'Chrome PDF Viewer' }, { name: 'Native Client' }];
            Object.defineProperty(navigator, 'plugins', { get: () => mockPlugins });
        }
    } catch (e) {}
    return true;
})()"#;

/// Installs an EventSource wrapper that buffers streamed messages
///
/// Messages accumulate in a page-global buffer until drained with
/// [`SSE_DRAIN_SCRIPT`].
pub const SSE_TAP_SCRIPT: &str = r#"(function() {
    if (window.__utsushi_sse_tap) return true;
    window.__utsushi_sse_tap = true;
    const RealEventSource = window.EventSource;
    if (!RealEventSource) return false;
    window.__utsushi_sse = [];
    window.EventSource = function(url, options) {
        const es = new RealEventSource(url, options);
        es.addEventListener('message', (e) => {
            window.__utsushi_sse.push({ url: String(url), data: e.data, type: e.type, timestamp: Date.now() });
        });
        return es;
    };
    return true;
})()"#;

/// Atomically drains the streamed-message buffer
pub const SSE_DRAIN_SCRIPT: &str = "(window.__utsushi_sse || []).splice(0)";

/// Builds the auto-scroll script used before foreground snapshots
///
/// Scrolls to the bottom in steps so lazy-loaded content enters the DOM,
/// then returns to the top. Stealth mode jitters step sizes and pauses.
pub fn scroll_script(stealth: bool) -> String {
    format!(
        r#"(function() {{
    const stealth = {stealth};
    const stepPx = stealth ? 600 : 800;
    const total = document.documentElement.scrollHeight;
    if (!total || total < 400) return 0;
    const steps = Math.min(Math.ceil(total / stepPx), 40);
    let i = 0;
    const tick = () => {{
        let target = i * stepPx;
        if (stealth) target += (Math.random() - 0.5) * 200;
        window.scrollTo(0, target);
        i++;
        if (i <= steps) {{
            let wait = stealth ? (200 + Math.random() * 300) : 250;
            setTimeout(tick, wait);
        }} else {{
            window.scrollTo(0, 0);
        }}
    }};
    tick();
    return steps;
}})()"#
    )
}
