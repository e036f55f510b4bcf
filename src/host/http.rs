//! HTTP-backed implementation of the browser capability surface
//!
//! [`HttpHost`] emulates enough of a browser for the crawl pipeline to run
//! without one attached: navigation fetches the document over plain HTTP,
//! then fetches the stylesheets, scripts, and images it references and
//! reports all of them through the network event stream. Page scripts do
//! not execute, so snapshots come from the static serializer and pages
//! that render client-side capture their served HTML as-is. References
//! inside CSS (`url(...)`) are not chased.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::{HeaderMap, CONTENT_TYPE, SET_COOKIE};
use reqwest::Client;
use scraper::{Html, Selector};
use url::Url;

use crate::agent::{self, snapshot_from_document};
use crate::capture::{CapturedRequest, Cookie};

use super::{BrowserHost, HostError, HostResult, TabId};

/// Builds the HTTP client shared by every [`HttpHost`] fetch
///
/// Redirects are followed (reqwest's default, up to 10 hops), so recorded
/// URLs and tab URLs reflect the final location of each response.
///
/// # Arguments
///
/// * `user_agent` - User-Agent header sent with every request
/// * `timeout` - Total per-request timeout
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use utsushi::host::build_http_client;
///
/// let client = build_http_client("utsushi/1.0", Duration::from_secs(30)).unwrap();
/// ```
pub fn build_http_client(user_agent: &str, timeout: Duration) -> HostResult<Client> {
    let client = Client::builder()
        .user_agent(user_agent)
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()?;
    Ok(client)
}

struct OpenTab {
    url: Url,
    document: String,
}

/// Browser host emulated over plain HTTP fetching
///
/// Tab handles map to fetched documents; the active tab is `tab#0` and
/// exists once it has been navigated. Script evaluation recognizes the
/// crate's own page scripts: the snapshot script runs the static DOM
/// serializer against the tab's document, the streamed-message drain
/// returns an empty list, and anything else evaluates to JSON `null`.
///
/// Key-value state lands under `state_dir` as one JSON file per key, and
/// finished archives land under `download_dir`.
pub struct HttpHost {
    client: Client,
    tabs: Mutex<HashMap<TabId, OpenTab>>,
    events: Mutex<Vec<CapturedRequest>>,
    jar: Mutex<Vec<Cookie>>,
    fetched: Mutex<HashSet<String>>,
    next_tab: AtomicU32,
    state_dir: PathBuf,
    download_dir: PathBuf,
}

impl HttpHost {
    /// Creates a host that fetches with `client`
    ///
    /// # Arguments
    ///
    /// * `client` - HTTP client, typically from [`build_http_client`]
    /// * `state_dir` - Directory for persisted key-value state
    /// * `download_dir` - Directory where downloaded files are written
    pub fn new(client: Client, state_dir: impl Into<PathBuf>, download_dir: impl Into<PathBuf>) -> Self {
        HttpHost {
            client,
            tabs: Mutex::new(HashMap::new()),
            events: Mutex::new(Vec::new()),
            jar: Mutex::new(Vec::new()),
            fetched: Mutex::new(HashSet::new()),
            next_tab: AtomicU32::new(1),
            state_dir: state_dir.into(),
            download_dir: download_dir.into(),
        }
    }

    /// Fetches `url` and its direct subresources into `tab`
    async fn load_into(&self, tab: TabId, url: &Url) -> HostResult<()> {
        let (final_url, document) = self.fetch_document(url).await?;

        // Html is not Send, so parsing stays scoped between awaits.
        let subresources = {
            let parsed = Html::parse_document(&document);
            collect_subresources(&parsed, &final_url)
        };
        for asset_url in &subresources {
            self.fetch_subresource(asset_url).await;
        }

        let mut tabs = lock(&self.tabs);
        tabs.insert(tab, OpenTab { url: final_url, document });
        Ok(())
    }

    async fn fetch_document(&self, url: &Url) -> HostResult<(Url, String)> {
        let response = self.client.get(url.clone()).send().await?;
        let final_url = response.url().clone();
        let status = response.status().as_u16();
        let mut mime = content_type(response.headers());
        if mime.is_empty() {
            mime = "text/html".to_string();
        }
        self.harvest_cookies(response.headers(), &final_url);

        let body = response.text().await?;
        self.push_event(CapturedRequest {
            url: final_url.to_string(),
            method: "GET".to_string(),
            status,
            mime_type: mime,
            size: body.len() as u64,
            content: Some(body.clone()),
            encoding: None,
        });
        Ok((final_url, body))
    }

    /// Fetches one referenced asset; failures are logged, never fatal
    async fn fetch_subresource(&self, url: &Url) {
        {
            let fetched = lock(&self.fetched);
            if fetched.contains(url.as_str()) {
                return;
            }
        }

        let response = match self.client.get(url.clone()).send().await {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(%url, %error, "Subresource fetch failed");
                return;
            }
        };
        let status = response.status().as_u16();
        let mime = content_type(response.headers());
        self.harvest_cookies(response.headers(), url);

        let bytes = match response.bytes().await {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(%url, %error, "Subresource body read failed");
                return;
            }
        };
        let (content, encoding) = if is_text_mime(&mime) {
            (String::from_utf8_lossy(&bytes).into_owned(), None)
        } else {
            (STANDARD.encode(&bytes), Some("base64".to_string()))
        };

        self.push_event(CapturedRequest {
            url: url.to_string(),
            method: "GET".to_string(),
            status,
            mime_type: mime,
            size: bytes.len() as u64,
            content: Some(content),
            encoding,
        });
        lock(&self.fetched).insert(url.to_string());
    }

    fn push_event(&self, request: CapturedRequest) {
        lock(&self.events).push(request);
    }

    fn harvest_cookies(&self, headers: &HeaderMap, url: &Url) {
        let host = match url.host_str() {
            Some(host) => host.to_ascii_lowercase(),
            None => return,
        };
        for raw in headers.get_all(SET_COOKIE) {
            if let Ok(raw) = raw.to_str() {
                if let Some(cookie) = parse_set_cookie(raw, &host) {
                    self.store_cookie(cookie);
                }
            }
        }
    }

    fn store_cookie(&self, cookie: Cookie) {
        let mut jar = lock(&self.jar);
        match jar
            .iter_mut()
            .find(|existing| existing.name == cookie.name && existing.domain == cookie.domain)
        {
            Some(existing) => *existing = cookie,
            None => jar.push(cookie),
        }
    }

    fn state_path(&self, key: &str) -> PathBuf {
        self.state_dir.join(format!("{}.json", sanitize_component(key)))
    }
}

#[async_trait]
impl BrowserHost for HttpHost {
    fn active_tab(&self) -> TabId {
        TabId(0)
    }

    async fn navigate(&self, tab: TabId, url: &Url) -> HostResult<()> {
        tracing::debug!(%tab, %url, "Navigating");
        self.load_into(tab, url).await
    }

    async fn open_hidden_tab(&self, url: &Url) -> HostResult<TabId> {
        let tab = TabId(self.next_tab.fetch_add(1, Ordering::Relaxed));
        self.load_into(tab, url).await?;
        tracing::debug!(%tab, %url, "Opened hidden tab");
        Ok(tab)
    }

    async fn wait_for_load_complete(&self, tab: TabId, _timeout: Duration) -> HostResult<()> {
        // Documents finish loading inside navigate, so only existence can fail.
        if lock(&self.tabs).contains_key(&tab) {
            Ok(())
        } else {
            Err(HostError::TabGone(tab))
        }
    }

    async fn close_tab(&self, tab: TabId) -> HostResult<()> {
        lock(&self.tabs).remove(&tab);
        Ok(())
    }

    async fn evaluate_in_page(&self, tab: TabId, script: &str) -> HostResult<serde_json::Value> {
        let (url, document) = {
            let tabs = lock(&self.tabs);
            match tabs.get(&tab) {
                Some(open) => (open.url.clone(), open.document.clone()),
                None => return Err(HostError::TabGone(tab)),
            }
        };

        if script == agent::SNAPSHOT_SCRIPT {
            let snapshot = snapshot_from_document(&document, &url);
            return serde_json::to_value(snapshot).map_err(|error| HostError::Script(error.to_string()));
        }
        if script == agent::SSE_DRAIN_SCRIPT {
            return Ok(serde_json::Value::Array(Vec::new()));
        }
        // Stealth, scroll, and tap scripts have nothing to do statically.
        Ok(serde_json::Value::Null)
    }

    async fn get_cookies(&self, url: &Url) -> HostResult<Vec<Cookie>> {
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        let jar = lock(&self.jar);
        Ok(jar
            .iter()
            .filter(|cookie| cookie_matches_host(cookie, &host))
            .cloned()
            .collect())
    }

    async fn drain_network_events(&self) -> HostResult<Vec<CapturedRequest>> {
        Ok(std::mem::take(&mut *lock(&self.events)))
    }

    async fn persist_state(&self, key: &str, value: &serde_json::Value) -> HostResult<()> {
        tokio::fs::create_dir_all(&self.state_dir).await?;
        let bytes =
            serde_json::to_vec(value).map_err(|error| HostError::Persistence(error.to_string()))?;
        tokio::fs::write(self.state_path(key), bytes).await?;
        tracing::debug!(key, "Persisted host state");
        Ok(())
    }

    async fn load_state(&self, key: &str) -> HostResult<Option<serde_json::Value>> {
        let path = self.state_path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        let value = serde_json::from_slice(&bytes).map_err(|error| {
            HostError::Persistence(format!("{} holds invalid JSON: {error}", path.display()))
        })?;
        Ok(Some(value))
    }

    async fn clear_state(&self, key: &str) -> HostResult<()> {
        match tokio::fs::remove_file(self.state_path(key)).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    async fn notify_user(&self, title: &str, message: &str) -> HostResult<()> {
        tracing::info!("{title}: {message}");
        Ok(())
    }

    async fn download_file(&self, bytes: &[u8], filename: &str) -> HostResult<()> {
        tokio::fs::create_dir_all(&self.download_dir).await?;
        let path = self.download_dir.join(sanitize_component(filename));
        tokio::fs::write(&path, bytes).await?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "Saved file");
        Ok(())
    }

    async fn ping(&self) -> HostResult<()> {
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Whether a body with this MIME type is stored as text rather than base64
fn is_text_mime(mime: &str) -> bool {
    let mime = mime.to_ascii_lowercase();
    mime.starts_with("text/")
        || ["json", "javascript", "ecmascript", "xml", "svg", "html", "css"]
            .iter()
            .any(|marker| mime.contains(marker))
}

/// Resolves the stylesheet, script, and image URLs a document references
fn collect_subresources(document: &Html, base: &Url) -> Vec<Url> {
    let mut seen = HashSet::new();
    let mut urls = Vec::new();
    let mut add = |raw: &str| {
        if let Ok(resolved) = base.join(raw) {
            if matches!(resolved.scheme(), "http" | "https") && seen.insert(resolved.to_string()) {
                urls.push(resolved);
            }
        }
    };

    if let Ok(selector) = Selector::parse("link[href]") {
        for element in document.select(&selector) {
            let rel = element.value().attr("rel").unwrap_or_default();
            if !is_fetchable_rel(rel) {
                continue;
            }
            if let Some(href) = element.value().attr("href") {
                add(href);
            }
        }
    }
    if let Ok(selector) = Selector::parse("script[src]") {
        for element in document.select(&selector) {
            if let Some(src) = element.value().attr("src") {
                add(src);
            }
        }
    }
    if let Ok(selector) = Selector::parse("img[src]") {
        for element in document.select(&selector) {
            if let Some(src) = element.value().attr("src") {
                add(src);
            }
        }
    }

    urls
}

/// Whether a `link` rel names something a browser fetches eagerly
fn is_fetchable_rel(rel: &str) -> bool {
    rel.to_ascii_lowercase().split_whitespace().any(|token| {
        matches!(token, "stylesheet" | "icon" | "preload" | "manifest" | "apple-touch-icon")
    })
}

/// Parses one `Set-Cookie` header value
///
/// `default_host` fills the domain when the header carries no `Domain`
/// attribute. `Max-Age` takes precedence over `Expires`.
fn parse_set_cookie(raw: &str, default_host: &str) -> Option<Cookie> {
    let mut parts = raw.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut cookie = Cookie {
        name: name.to_string(),
        value: value.trim().to_string(),
        domain: Some(default_host.to_string()),
        path: None,
        secure: None,
        http_only: None,
        expires: None,
    };

    for attribute in parts {
        let attribute = attribute.trim();
        let (key, val) = match attribute.split_once('=') {
            Some((key, val)) => (key.trim().to_ascii_lowercase(), val.trim()),
            None => (attribute.to_ascii_lowercase(), ""),
        };
        match key.as_str() {
            "domain" if !val.is_empty() => {
                cookie.domain = Some(val.trim_start_matches('.').to_ascii_lowercase());
            }
            "path" if !val.is_empty() => cookie.path = Some(val.to_string()),
            "secure" => cookie.secure = Some(true),
            "httponly" => cookie.http_only = Some(true),
            "max-age" => {
                if let Ok(seconds) = val.parse::<f64>() {
                    let now = SystemTime::now()
                        .duration_since(SystemTime::UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_secs_f64();
                    cookie.expires = Some(now + seconds);
                }
            }
            "expires" => {
                if cookie.expires.is_none() {
                    if let Ok(when) = chrono::DateTime::parse_from_rfc2822(val) {
                        cookie.expires = Some(when.timestamp() as f64);
                    }
                }
            }
            _ => {}
        }
    }

    Some(cookie)
}

fn cookie_matches_host(cookie: &Cookie, host: &str) -> bool {
    match cookie.domain.as_deref() {
        Some(domain) => host == domain || host.ends_with(&format!(".{domain}")),
        None => false,
    }
}

/// Flattens a key or filename into one safe path component
fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn test_host(dir: &TempDir) -> HttpHost {
        let client = build_http_client("utsushi-test/1.0", Duration::from_secs(5)).unwrap();
        HttpHost::new(client, dir.path().join("state"), dir.path().join("downloads"))
    }

    #[test]
    fn test_set_cookie_parses_attributes() {
        let cookie =
            parse_set_cookie("sid=abc123; Path=/; Domain=.example.com; Secure; HttpOnly", "www.example.com")
                .unwrap();
        assert_eq!(cookie.name, "sid");
        assert_eq!(cookie.value, "abc123");
        assert_eq!(cookie.domain.as_deref(), Some("example.com"));
        assert_eq!(cookie.path.as_deref(), Some("/"));
        assert_eq!(cookie.secure, Some(true));
        assert_eq!(cookie.http_only, Some(true));
        assert!(cookie.expires.is_none());
    }

    #[test]
    fn test_set_cookie_defaults_domain_to_response_host() {
        let cookie = parse_set_cookie("theme=dark", "app.example.com").unwrap();
        assert_eq!(cookie.domain.as_deref(), Some("app.example.com"));
        assert_eq!(cookie.value, "dark");
    }

    #[test]
    fn test_set_cookie_rejects_nameless_pairs() {
        assert!(parse_set_cookie("=orphan", "example.com").is_none());
        assert!(parse_set_cookie("no-equals-sign", "example.com").is_none());
    }

    #[test]
    fn test_set_cookie_max_age_sets_expiry() {
        let cookie = parse_set_cookie("sid=x; Max-Age=3600", "example.com").unwrap();
        let expires = cookie.expires.unwrap();
        let now = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_secs_f64();
        assert!(expires > now + 3000.0 && expires < now + 4200.0);
    }

    #[test]
    fn test_set_cookie_expires_parses_http_date() {
        let cookie =
            parse_set_cookie("sid=x; Expires=Wed, 21 Oct 2065 07:28:00 GMT", "example.com").unwrap();
        assert!(cookie.expires.unwrap() > 3_000_000_000.0);
    }

    #[test]
    fn test_cookie_host_matching_covers_subdomains() {
        let cookie = parse_set_cookie("sid=x; Domain=example.com", "example.com").unwrap();
        assert!(cookie_matches_host(&cookie, "example.com"));
        assert!(cookie_matches_host(&cookie, "shop.example.com"));
        assert!(!cookie_matches_host(&cookie, "not-example.com"));
    }

    #[test]
    fn test_text_mime_detection() {
        assert!(is_text_mime("text/html; charset=utf-8"));
        assert!(is_text_mime("application/json"));
        assert!(is_text_mime("application/javascript"));
        assert!(is_text_mime("image/svg+xml"));
        assert!(!is_text_mime("image/png"));
        assert!(!is_text_mime("font/woff2"));
        assert!(!is_text_mime(""));
    }

    #[test]
    fn test_fetchable_rel_tokens() {
        assert!(is_fetchable_rel("stylesheet"));
        assert!(is_fetchable_rel("shortcut icon"));
        assert!(is_fetchable_rel("PRELOAD"));
        assert!(!is_fetchable_rel("canonical"));
        assert!(!is_fetchable_rel(""));
    }

    #[test]
    fn test_sanitize_component_flattens_separators() {
        assert_eq!(sanitize_component("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_component("utsushi_session"), "utsushi_session");
        assert_eq!(sanitize_component(""), "_");
    }

    #[test]
    fn test_collect_subresources_resolves_and_filters() {
        let html = r#"<html><head>
            <link rel="stylesheet" href="/app.css">
            <link rel="canonical" href="https://example.com/about">
            <link rel="icon" href="favicon.ico">
            <script src="https://cdn.example.com/lib.js"></script>
        </head><body>
            <img src="/logo.png">
            <img src="/logo.png">
            <img src="data:image/gif;base64,R0lGOD">
        </body></html>"#;
        let base = Url::parse("https://example.com/docs/").unwrap();

        let parsed = Html::parse_document(html);
        let urls: Vec<String> = collect_subresources(&parsed, &base)
            .into_iter()
            .map(String::from)
            .collect();

        assert_eq!(
            urls,
            vec![
                "https://example.com/app.css",
                "https://example.com/docs/favicon.ico",
                "https://cdn.example.com/lib.js",
                "https://example.com/logo.png",
            ]
        );
    }

    #[tokio::test]
    async fn test_state_round_trip() {
        let dir = TempDir::new().unwrap();
        let host = test_host(&dir);
        let value = serde_json::json!({"requests": [], "pages": {}});

        host.persist_state("utsushi_session", &value).await.unwrap();
        let loaded = host.load_state("utsushi_session").await.unwrap();
        assert_eq!(loaded, Some(value));

        host.clear_state("utsushi_session").await.unwrap();
        assert_eq!(host.load_state("utsushi_session").await.unwrap(), None);
        // Clearing again stays fine.
        host.clear_state("utsushi_session").await.unwrap();
    }

    #[tokio::test]
    async fn test_load_state_rejects_corrupt_json() {
        let dir = TempDir::new().unwrap();
        let host = test_host(&dir);
        tokio::fs::create_dir_all(dir.path().join("state")).await.unwrap();
        tokio::fs::write(dir.path().join("state/broken.json"), b"{nope")
            .await
            .unwrap();

        let error = host.load_state("broken").await.unwrap_err();
        assert!(matches!(error, HostError::Persistence(_)));
    }

    #[tokio::test]
    async fn test_download_writes_into_download_dir() {
        let dir = TempDir::new().unwrap();
        let host = test_host(&dir);

        host.download_file(b"zip bytes", "clone.zip").await.unwrap();
        let written = tokio::fs::read(dir.path().join("downloads/clone.zip")).await.unwrap();
        assert_eq!(written, b"zip bytes");
    }

    #[tokio::test]
    async fn test_evaluate_on_unknown_tab_is_tab_gone() {
        let dir = TempDir::new().unwrap();
        let host = test_host(&dir);

        let error = host
            .evaluate_in_page(TabId(42), agent::SNAPSHOT_SCRIPT)
            .await
            .unwrap_err();
        assert!(matches!(error, HostError::TabGone(TabId(42))));
    }

    #[tokio::test]
    async fn test_drain_empties_the_event_buffer() {
        let dir = TempDir::new().unwrap();
        let host = test_host(&dir);
        host.push_event(CapturedRequest {
            url: "https://example.com/app.css".to_string(),
            method: "GET".to_string(),
            status: 200,
            mime_type: "text/css".to_string(),
            size: 10,
            content: Some("body{}".to_string()),
            encoding: None,
        });

        assert_eq!(host.drain_network_events().await.unwrap().len(), 1);
        assert!(host.drain_network_events().await.unwrap().is_empty());
    }
}
