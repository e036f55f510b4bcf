use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::capture::PageSnapshot;
use crate::host::{BrowserHost, HostResult, TabId};

use super::scripts;
use super::settle::SettleDetector;
use super::snapshot::parse_snapshot_payload;

/// Pause after issuing a navigation before settle polling begins
const POST_NAVIGATION_PAUSE: Duration = Duration::from_millis(800);

/// Bounded wait for the in-page auto-scroll to finish
const SCROLL_WAIT: Duration = Duration::from_millis(1500);
const SCROLL_WAIT_STEALTH: Duration = Duration::from_millis(3500);

/// Per-capture timing and behavior knobs
#[derive(Debug, Clone, Copy)]
pub struct CapturePolicy {
    /// Evaluate the fingerprint script and slow the scroll
    pub stealth: bool,
    /// Ceiling on background-tab load-complete
    pub tab_load_timeout: Duration,
    /// Fixed settle delay after a background tab reports load-complete
    pub background_settle: Duration,
}

/// Captures single pages through the browser-host boundary
///
/// Foreground mode drives the host's active tab: navigate, settle-wait,
/// auto-scroll (pulls lazy-loaded content into the DOM), snapshot in
/// place. Background mode opens a hidden tab, waits for load-complete
/// plus a fixed delay, snapshots, and always closes the tab — which is
/// what lets several captures run concurrently without disturbing the
/// visible tab.
pub struct PageCaptureAgent<H: BrowserHost> {
    host: Arc<H>,
    settle: SettleDetector,
    policy: CapturePolicy,
}

impl<H: BrowserHost> PageCaptureAgent<H> {
    pub fn new(host: Arc<H>, settle: SettleDetector, policy: CapturePolicy) -> Self {
        PageCaptureAgent {
            host,
            settle,
            policy,
        }
    }

    /// Navigates the active tab to `url` and snapshots it in place
    pub async fn capture_foreground(&self, url: &Url) -> HostResult<PageSnapshot> {
        let tab = self.host.active_tab();

        self.host.navigate(tab, url).await?;
        // the navigation itself counts as network activity
        self.settle.activity().touch();
        tokio::time::sleep(POST_NAVIGATION_PAUSE).await;
        self.install_stream_tap(tab).await?;

        let outcome = self.settle.wait_settled().await;
        tracing::debug!(url = %url, ?outcome, "foreground settle finished");

        self.apply_stealth(tab).await?;
        self.auto_scroll(tab).await?;

        let value = self.host.evaluate_in_page(tab, scripts::SNAPSHOT_SCRIPT).await?;
        parse_snapshot_payload(value)
    }

    /// Captures `url` in a hidden tab without touching the active one
    ///
    /// The tab is closed on every exit path; close failures are logged
    /// and never mask the capture result.
    pub async fn capture_background(&self, url: &Url) -> HostResult<PageSnapshot> {
        let tab = self.host.open_hidden_tab(url).await?;
        let result = self.background_inner(tab, url).await;

        if let Err(e) = self.host.close_tab(tab).await {
            tracing::warn!(%tab, error = %e, "failed to close background tab");
        }
        result
    }

    async fn background_inner(&self, tab: TabId, url: &Url) -> HostResult<PageSnapshot> {
        self.host
            .wait_for_load_complete(tab, self.policy.tab_load_timeout)
            .await?;
        tokio::time::sleep(self.policy.background_settle).await;

        self.apply_stealth(tab).await?;

        let value = self.host.evaluate_in_page(tab, scripts::SNAPSHOT_SCRIPT).await?;
        let snapshot = parse_snapshot_payload(value)?;
        tracing::debug!(url = %url, title = %snapshot.title, "background capture complete");
        Ok(snapshot)
    }

    /// Installs the streamed-message tap so event-stream traffic arriving
    /// while the page settles gets buffered for later draining
    async fn install_stream_tap(&self, tab: TabId) -> HostResult<()> {
        match self.host.evaluate_in_page(tab, scripts::SSE_TAP_SCRIPT).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::debug!(error = %e, "stream tap install failed; continuing");
                Ok(())
            }
        }
    }

    /// Best-effort fingerprint adjustment; only fatal errors propagate
    async fn apply_stealth(&self, tab: TabId) -> HostResult<()> {
        if !self.policy.stealth {
            return Ok(());
        }
        match self.host.evaluate_in_page(tab, scripts::STEALTH_SCRIPT).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::debug!(error = %e, "stealth script failed; continuing");
                Ok(())
            }
        }
    }

    /// Best-effort lazy-content scroll with a bounded wait
    async fn auto_scroll(&self, tab: TabId) -> HostResult<()> {
        let script = scripts::scroll_script(self.policy.stealth);
        match self.host.evaluate_in_page(tab, &script).await {
            Ok(_) => {}
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                tracing::debug!(error = %e, "auto-scroll failed; continuing");
                return Ok(());
            }
        }
        let wait = if self.policy.stealth {
            SCROLL_WAIT_STEALTH
        } else {
            SCROLL_WAIT
        };
        tokio::time::sleep(wait).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::settle::{ActivityTracker, SettlePolicy};
    use crate::capture::{CapturedRequest, Cookie};
    use crate::host::HostError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Minimal host: canned snapshot, optional load failure, close log
    struct ProbeHost {
        fail_load: bool,
        closed: Mutex<Vec<TabId>>,
    }

    impl ProbeHost {
        fn new(fail_load: bool) -> Self {
            ProbeHost {
                fail_load,
                closed: Mutex::new(Vec::new()),
            }
        }

        fn closed_tabs(&self) -> Vec<TabId> {
            self.closed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BrowserHost for ProbeHost {
        fn active_tab(&self) -> TabId {
            TabId(0)
        }

        async fn navigate(&self, _tab: TabId, _url: &Url) -> HostResult<()> {
            Ok(())
        }

        async fn open_hidden_tab(&self, _url: &Url) -> HostResult<TabId> {
            Ok(TabId(7))
        }

        async fn wait_for_load_complete(
            &self,
            _tab: TabId,
            timeout: Duration,
        ) -> HostResult<()> {
            if self.fail_load {
                Err(HostError::Timeout {
                    what: "load-complete".to_string(),
                    waited_ms: timeout.as_millis() as u64,
                })
            } else {
                Ok(())
            }
        }

        async fn close_tab(&self, tab: TabId) -> HostResult<()> {
            self.closed.lock().unwrap().push(tab);
            Ok(())
        }

        async fn evaluate_in_page(
            &self,
            _tab: TabId,
            _script: &str,
        ) -> HostResult<serde_json::Value> {
            Ok(serde_json::json!({
                "url": "https://example.com/",
                "title": "Probe",
                "html": "<html><head></head><body></body></html>",
                "storage": {"local": {}, "session": {}},
                "inlineStyles": [],
                "internalLinks": []
            }))
        }

        async fn get_cookies(&self, _url: &Url) -> HostResult<Vec<Cookie>> {
            Ok(vec![])
        }

        async fn drain_network_events(&self) -> HostResult<Vec<CapturedRequest>> {
            Ok(vec![])
        }

        async fn persist_state(&self, _key: &str, _value: &serde_json::Value) -> HostResult<()> {
            Ok(())
        }

        async fn load_state(&self, _key: &str) -> HostResult<Option<serde_json::Value>> {
            Ok(None)
        }

        async fn clear_state(&self, _key: &str) -> HostResult<()> {
            Ok(())
        }

        async fn notify_user(&self, _title: &str, _message: &str) -> HostResult<()> {
            Ok(())
        }

        async fn download_file(&self, _bytes: &[u8], _filename: &str) -> HostResult<()> {
            Ok(())
        }

        async fn ping(&self) -> HostResult<()> {
            Ok(())
        }
    }

    fn agent(host: Arc<ProbeHost>) -> PageCaptureAgent<ProbeHost> {
        let settle = SettleDetector::new(
            Arc::new(ActivityTracker::new()),
            SettlePolicy {
                grace: Duration::from_millis(1),
                idle: Duration::from_millis(1),
                poll: Duration::from_millis(1),
                max_wait: Duration::from_millis(50),
            },
        );
        PageCaptureAgent::new(
            host,
            settle,
            CapturePolicy {
                stealth: false,
                tab_load_timeout: Duration::from_millis(100),
                background_settle: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_capture_closes_tab_on_success() {
        let host = Arc::new(ProbeHost::new(false));
        let agent = agent(host.clone());

        let url = Url::parse("https://example.com/").unwrap();
        let snapshot = agent.capture_background(&url).await.unwrap();

        assert_eq!(snapshot.title, "Probe");
        assert_eq!(host.closed_tabs(), vec![TabId(7)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_capture_closes_tab_on_timeout() {
        let host = Arc::new(ProbeHost::new(true));
        let agent = agent(host.clone());

        let url = Url::parse("https://example.com/").unwrap();
        let err = agent.capture_background(&url).await.unwrap_err();

        assert!(matches!(err, HostError::Timeout { .. }));
        // tab still closed in the cleanup path
        assert_eq!(host.closed_tabs(), vec![TabId(7)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreground_capture_returns_snapshot() {
        let host = Arc::new(ProbeHost::new(false));
        let agent = agent(host.clone());

        let url = Url::parse("https://example.com/").unwrap();
        let snapshot = agent.capture_foreground(&url).await.unwrap();
        assert_eq!(snapshot.url, "https://example.com/");
        // foreground path never opens or closes tabs
        assert!(host.closed_tabs().is_empty());
    }
}
