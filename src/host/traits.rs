use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::capture::{CapturedRequest, Cookie};

use super::{HostResult, TabId};

/// Asynchronous capability interface to the hosting browser environment
///
/// The crawl pipeline never touches a browser directly; it awaits these
/// operations and treats every error through the [`super::HostError`]
/// taxonomy. Implementations must be safe to share across worker tasks.
#[async_trait]
pub trait BrowserHost: Send + Sync {
    /// The tab whose session drives foreground captures
    fn active_tab(&self) -> TabId;

    /// Forces a full top-level navigation of `tab` to `url`
    ///
    /// Must bypass client-side routing: a soft route change suppresses the
    /// network events settle detection and capture depend on.
    async fn navigate(&self, tab: TabId, url: &Url) -> HostResult<()>;

    /// Opens a background tab on `url` and returns its handle
    async fn open_hidden_tab(&self, url: &Url) -> HostResult<TabId>;

    /// Resolves once `tab` reaches load-complete, or times out
    async fn wait_for_load_complete(&self, tab: TabId, timeout: Duration) -> HostResult<()>;

    /// Closes a tab; idempotent for already-closed tabs
    async fn close_tab(&self, tab: TabId) -> HostResult<()>;

    /// Evaluates a script in the page loaded in `tab`, returning its
    /// JSON-structured result
    async fn evaluate_in_page(&self, tab: TabId, script: &str) -> HostResult<serde_json::Value>;

    /// Cookies visible to `url`
    async fn get_cookies(&self, url: &Url) -> HostResult<Vec<Cookie>>;

    /// Drains network responses completed since the previous call
    ///
    /// The poll-based form of a response-finished event stream; entries
    /// arrive in completion order.
    async fn drain_network_events(&self) -> HostResult<Vec<CapturedRequest>>;

    /// Persists `value` under `key` in host-managed storage
    async fn persist_state(&self, key: &str, value: &serde_json::Value) -> HostResult<()>;

    /// Loads the value persisted under `key`, if any
    async fn load_state(&self, key: &str) -> HostResult<Option<serde_json::Value>>;

    /// Removes the value persisted under `key`
    async fn clear_state(&self, key: &str) -> HostResult<()>;

    /// Shows a user-facing notification
    async fn notify_user(&self, title: &str, message: &str) -> HostResult<()>;

    /// Hands a finished file to the host's download surface
    async fn download_file(&self, bytes: &[u8], filename: &str) -> HostResult<()>;

    /// Keep-alive signal for the long-lived control channel
    ///
    /// Hosts may reclaim idle control channels; a crawl pings on an
    /// interval and treats [`super::HostError::ContextLost`] from here as
    /// a full-crawl abort.
    async fn ping(&self) -> HostResult<()>;
}
