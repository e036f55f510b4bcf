use std::collections::{BTreeMap, HashSet};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use super::classify::{classify, should_skip_url};
use super::types::{AssetTotals, CapturedRequest, Cookie, PageSnapshot, StreamedMessage};

/// Key under which the session is persisted through the host state surface
pub const SESSION_STATE_KEY: &str = "utsushi_session";

/// Minimum wall-time gap between two session persists
const PERSIST_INTERVAL: Duration = Duration::from_secs(5);

/// Capture-store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Cannot clear the capture store while a crawl is active")]
    CrawlActive,
}

/// Persisted session shape; counters are derived, not stored
#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionState {
    #[serde(default)]
    requests: Vec<CapturedRequest>,
    #[serde(default)]
    pages: BTreeMap<String, PageSnapshot>,
    #[serde(default)]
    cookies: Vec<Cookie>,
    #[serde(default)]
    sse: Vec<StreamedMessage>,
}

/// Ledger of everything captured in one cloning session
///
/// Owns the network entries (deduplicated by URL, first-seen wins), page
/// snapshots, merged cookies, and streamed-message log. Every mutation
/// comes through here, so a crawl with parallel workers wraps the store in
/// `Arc<Mutex<_>>` and the assembler only ever reads.
pub struct CaptureStore {
    origin_host: Option<String>,
    same_origin_only: bool,
    requests: Vec<CapturedRequest>,
    request_urls: HashSet<String>,
    pages: BTreeMap<String, PageSnapshot>,
    cookies: Vec<Cookie>,
    sse: Vec<StreamedMessage>,
    totals: AssetTotals,
    crawl_active: bool,
    last_persisted: Option<Instant>,
}

impl CaptureStore {
    /// Creates an empty store scoped to the seed's origin
    ///
    /// With `same_origin_only` set, requests whose host is neither the
    /// seed host nor one of its subdomains are rejected.
    pub fn new(seed: &Url, same_origin_only: bool) -> Self {
        CaptureStore {
            origin_host: seed.host_str().map(str::to_string),
            same_origin_only,
            requests: Vec::new(),
            request_urls: HashSet::new(),
            pages: BTreeMap::new(),
            cookies: Vec::new(),
            sse: Vec::new(),
            totals: AssetTotals::default(),
            crawl_active: false,
            last_persisted: None,
        }
    }

    /// Records a completed network response
    ///
    /// Returns `false` without storing when the URL was already recorded,
    /// matches the skip policy, or fails the domain filter. Accepted
    /// entries update the running totals immediately.
    pub fn record_request(&mut self, entry: CapturedRequest) -> bool {
        if self.request_urls.contains(&entry.url) {
            return false;
        }
        if should_skip_url(&entry.url) {
            tracing::trace!(url = %entry.url, "skip policy rejected request");
            return false;
        }
        if self.same_origin_only && !self.host_allowed(&entry.url) {
            tracing::trace!(url = %entry.url, "domain filter rejected request");
            return false;
        }

        let kind = classify(&entry.mime_type, &entry.url);
        self.totals.bump(kind, entry.size);
        tracing::debug!(url = %entry.url, kind = %kind, status = entry.status, "recorded request");

        self.request_urls.insert(entry.url.clone());
        self.requests.push(entry);
        true
    }

    /// Upserts a page snapshot and merges newly observed cookies
    ///
    /// Re-capturing a URL replaces its snapshot; cookies are deduplicated
    /// by name and existing cookies are never overwritten.
    pub fn record_page(&mut self, snapshot: PageSnapshot, cookies: Vec<Cookie>) {
        if !self.pages.contains_key(&snapshot.url) {
            self.totals.pages += 1;
        }
        tracing::debug!(url = %snapshot.url, title = %snapshot.title, "recorded page snapshot");
        self.pages.insert(snapshot.url.clone(), snapshot);

        let known: HashSet<String> = self.cookies.iter().map(|c| c.name.clone()).collect();
        for cookie in cookies {
            if !known.contains(&cookie.name) {
                self.cookies.push(cookie);
            }
        }
    }

    /// Appends drained streamed messages to the session log
    pub fn record_streamed(&mut self, messages: Vec<StreamedMessage>) {
        if !messages.is_empty() {
            tracing::debug!(count = messages.len(), "recorded streamed messages");
            self.sse.extend(messages);
        }
    }

    /// Marks a crawl as running; guards `clear()`
    pub fn set_crawl_active(&mut self, active: bool) {
        self.crawl_active = active;
    }

    pub fn is_crawl_active(&self) -> bool {
        self.crawl_active
    }

    /// Wipes all captured state
    ///
    /// Refused while a crawl is active — clearing mid-run would lose data
    /// workers are still producing. The caller is responsible for also
    /// clearing the persisted copy through the host.
    pub fn clear(&mut self) -> Result<(), StoreError> {
        if self.crawl_active {
            return Err(StoreError::CrawlActive);
        }
        self.requests.clear();
        self.request_urls.clear();
        self.pages.clear();
        self.cookies.clear();
        self.sse.clear();
        self.totals = AssetTotals::default();
        self.last_persisted = None;
        Ok(())
    }

    /// Rebuilds the store from a persisted session payload
    ///
    /// Tolerates a malformed payload by leaving the store empty; derived
    /// state (URL set, totals) is recomputed rather than trusted.
    pub fn restore_from(&mut self, payload: serde_json::Value) -> bool {
        let state: SessionState = match serde_json::from_value(payload) {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(error = %e, "persisted session was malformed; starting empty");
                return false;
            }
        };

        self.requests = state.requests;
        self.pages = state.pages;
        self.cookies = state.cookies;
        self.sse = state.sse;

        self.request_urls = self.requests.iter().map(|r| r.url.clone()).collect();
        self.totals = AssetTotals::default();
        for request in &self.requests {
            let kind = classify(&request.mime_type, &request.url);
            self.totals.bump(kind, request.size);
        }
        self.totals.pages = self.pages.len() as u64;

        tracing::info!(
            requests = self.requests.len(),
            pages = self.pages.len(),
            "restored previous session"
        );
        true
    }

    /// Serializes the session for persistence
    pub fn session_payload(&self) -> serde_json::Value {
        let state = SessionState {
            requests: self.requests.clone(),
            pages: self.pages.clone(),
            cookies: self.cookies.clone(),
            sse: self.sse.clone(),
        };
        serde_json::to_value(state).unwrap_or(serde_json::Value::Null)
    }

    /// Rate-limited persistence check
    ///
    /// Returns `true` at most once per `PERSIST_INTERVAL` and stamps the
    /// attempt, so callers persist only when due. The final save at crawl
    /// end should call [`CaptureStore::session_payload`] directly.
    pub fn persist_due(&mut self) -> bool {
        let due = self
            .last_persisted
            .map_or(true, |at| at.elapsed() >= PERSIST_INTERVAL);
        if due {
            self.last_persisted = Some(Instant::now());
        }
        due
    }

    pub fn requests(&self) -> &[CapturedRequest] {
        &self.requests
    }

    pub fn pages(&self) -> &BTreeMap<String, PageSnapshot> {
        &self.pages
    }

    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    pub fn streamed(&self) -> &[StreamedMessage] {
        &self.sse
    }

    pub fn totals(&self) -> &AssetTotals {
        &self.totals
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty() && self.pages.is_empty()
    }

    /// Domain filter: seed host or one of its subdomains
    fn host_allowed(&self, url: &str) -> bool {
        let Some(origin_host) = self.origin_host.as_deref() else {
            return true;
        };
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        match parsed.host_str() {
            Some(host) => host == origin_host || host.ends_with(&format!(".{}", origin_host)),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed() -> Url {
        Url::parse("https://example.com/").unwrap()
    }

    fn entry(url: &str, mime: &str) -> CapturedRequest {
        CapturedRequest {
            url: url.to_string(),
            method: "GET".to_string(),
            status: 200,
            mime_type: mime.to_string(),
            size: 100,
            content: Some("x".to_string()),
            encoding: None,
        }
    }

    fn snapshot(url: &str) -> PageSnapshot {
        PageSnapshot {
            url: url.to_string(),
            title: "t".to_string(),
            html: "<html></html>".to_string(),
            storage: Default::default(),
            inline_styles: vec![],
            internal_links: vec![],
        }
    }

    fn cookie(name: &str, value: &str) -> Cookie {
        Cookie {
            name: name.to_string(),
            value: value.to_string(),
            domain: None,
            path: None,
            secure: None,
            http_only: None,
            expires: None,
        }
    }

    #[test]
    fn test_dedup_first_seen_wins() {
        let mut store = CaptureStore::new(&seed(), false);
        let mut first = entry("https://example.com/app.js", "application/javascript");
        first.size = 1;
        let mut second = entry("https://example.com/app.js", "application/javascript");
        second.size = 2;

        assert!(store.record_request(first));
        assert!(!store.record_request(second));

        assert_eq!(store.requests().len(), 1);
        assert_eq!(store.requests()[0].size, 1);
    }

    #[test]
    fn test_no_two_entries_share_a_url() {
        let mut store = CaptureStore::new(&seed(), false);
        for url in [
            "https://example.com/a",
            "https://example.com/b",
            "https://example.com/a",
            "https://example.com/b",
            "https://example.com/c",
        ] {
            store.record_request(entry(url, "text/html"));
        }
        let mut urls: Vec<&str> = store.requests().iter().map(|r| r.url.as_str()).collect();
        let total = urls.len();
        urls.sort();
        urls.dedup();
        assert_eq!(urls.len(), total);
        assert_eq!(total, 3);
    }

    #[test]
    fn test_skip_policy_rejects() {
        let mut store = CaptureStore::new(&seed(), false);
        assert!(!store.record_request(entry("https://example.com/movie.mp4", "video/mp4")));
        assert!(!store.record_request(entry(
            "https://google-analytics.com/collect",
            "image/gif"
        )));
        assert!(store.requests().is_empty());
        assert_eq!(store.totals().total, 0);
    }

    #[test]
    fn test_domain_filter_allows_subdomains() {
        let mut store = CaptureStore::new(&seed(), true);
        assert!(store.record_request(entry("https://example.com/app.js", "text/javascript")));
        assert!(store.record_request(entry("https://cdn.example.com/x.css", "text/css")));
        assert!(!store.record_request(entry("https://elsewhere.net/x.js", "text/javascript")));
        assert_eq!(store.requests().len(), 2);
    }

    #[test]
    fn test_counters_track_categories() {
        let mut store = CaptureStore::new(&seed(), false);
        store.record_request(entry("https://example.com/", "text/html"));
        store.record_request(entry("https://example.com/a.css", "text/css"));
        store.record_request(entry("https://example.com/b.css", "text/css"));

        assert_eq!(store.totals().total, 3);
        assert_eq!(store.totals().html, 1);
        assert_eq!(store.totals().css, 2);
        assert_eq!(store.totals().bytes, 300);
    }

    #[test]
    fn test_page_upsert_and_cookie_merge() {
        let mut store = CaptureStore::new(&seed(), false);
        store.record_page(snapshot("https://example.com/"), vec![cookie("sid", "1")]);
        store.record_page(
            snapshot("https://example.com/"),
            vec![cookie("sid", "2"), cookie("theme", "dark")],
        );

        assert_eq!(store.pages().len(), 1);
        assert_eq!(store.totals().pages, 1);
        assert_eq!(store.cookies().len(), 2);
        // first-seen cookie value wins
        let sid = store.cookies().iter().find(|c| c.name == "sid").unwrap();
        assert_eq!(sid.value, "1");
    }

    #[test]
    fn test_clear_refused_while_crawl_active() {
        let mut store = CaptureStore::new(&seed(), false);
        store.record_request(entry("https://example.com/a", "text/html"));
        store.set_crawl_active(true);

        assert!(matches!(store.clear(), Err(StoreError::CrawlActive)));
        assert_eq!(store.requests().len(), 1);

        store.set_crawl_active(false);
        store.clear().unwrap();
        assert!(store.is_empty());
        assert_eq!(store.totals().total, 0);
    }

    #[test]
    fn test_restore_rebuilds_derived_state() {
        let mut source = CaptureStore::new(&seed(), false);
        source.record_request(entry("https://example.com/a.css", "text/css"));
        source.record_request(entry("https://example.com/", "text/html"));
        source.record_page(snapshot("https://example.com/"), vec![]);
        let payload = source.session_payload();

        let mut restored = CaptureStore::new(&seed(), false);
        assert!(restored.restore_from(payload));
        assert_eq!(restored.requests().len(), 2);
        assert_eq!(restored.totals().css, 1);
        assert_eq!(restored.totals().pages, 1);
        // dedup set was rebuilt: same URL is still rejected
        assert!(!restored.record_request(entry("https://example.com/a.css", "text/css")));
    }

    #[test]
    fn test_restore_tolerates_corrupt_payload() {
        let mut store = CaptureStore::new(&seed(), false);
        assert!(!store.restore_from(serde_json::json!("not a session")));
        assert!(store.is_empty());
    }

    #[test]
    fn test_persist_rate_limit() {
        let mut store = CaptureStore::new(&seed(), false);
        assert!(store.persist_due());
        assert!(!store.persist_due());
    }
}
