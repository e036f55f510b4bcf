//! Crawl coordination: the worker pool and its side loops
//!
//! The coordinator seeds the frontier, spawns a fixed pool of capture
//! workers plus two background loops (network pump, keep-alive), and
//! reports progress over an event channel. Two flags steer every loop:
//! `cancel` stops dequeuing while letting in-flight tasks finish, `fatal`
//! stops everything because the host control channel is gone.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use url::Url;

use crate::agent::{ActivityTracker, PageCaptureAgent, SettleDetector, SSE_DRAIN_SCRIPT};
use crate::capture::{CaptureStore, StreamedMessage, SESSION_STATE_KEY};
use crate::config::Config;
use crate::host::{BrowserHost, HostError};
use crate::url::{is_same_origin, normalize_url};
use crate::Result;

use super::frontier::{CrawlState, FrontierTask, RetryDecision};

/// Interval between keep-alive pings on the host control channel
const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(20);

/// Interval at which completed network responses are drained
const NETWORK_PUMP_INTERVAL: Duration = Duration::from_millis(250);

/// Interval at which the active page's streamed-message tap is drained
const STREAM_DRAIN_INTERVAL: Duration = Duration::from_secs(2);

/// Idle workers re-check the frontier at this pace while peers still have
/// tasks in flight
const WORKER_IDLE_POLL: Duration = Duration::from_millis(100);

/// Progress events emitted while a crawl runs
#[derive(Debug, Clone)]
pub enum CrawlEvent {
    /// Workers are starting on a freshly seeded frontier
    Started {
        seed: Url,
        max_depth: u32,
        workers: usize,
    },
    /// One page snapshot landed in the store
    PageCaptured { url: Url, depth: u32, title: String },
    /// A task went back to the frontier after a capture failure
    RetryScheduled { url: Url, attempt: u32, error: String },
    /// A task used up its retry budget
    PageFailed { url: Url, error: String },
    /// All workers stopped; carries the final summary
    Finished(CrawlOutcome),
}

/// Final accounting for one crawl run
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    /// Pages captured during this run
    pub pages_captured: usize,
    /// Pages that exhausted their retry budget
    pub pages_failed: usize,
    /// Network responses recorded in the store, restored ones included
    pub assets_captured: u64,
    pub bytes_captured: u64,
    /// Total requeues across all tasks
    pub retries: u32,
    /// The stop flag was observed before the frontier drained
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// Everything the worker pool and its side loops share
struct CrawlContext<H: BrowserHost> {
    config: Arc<Config>,
    seed: Url,
    host: Arc<H>,
    store: Arc<Mutex<CaptureStore>>,
    state: Arc<Mutex<CrawlState>>,
    cancel: Arc<AtomicBool>,
    fatal: Arc<AtomicBool>,
    fatal_reason: Arc<Mutex<Option<String>>>,
    activity: Arc<ActivityTracker>,
    events: UnboundedSender<CrawlEvent>,
}

impl<H: BrowserHost> Clone for CrawlContext<H> {
    fn clone(&self) -> Self {
        CrawlContext {
            config: self.config.clone(),
            seed: self.seed.clone(),
            host: self.host.clone(),
            store: self.store.clone(),
            state: self.state.clone(),
            cancel: self.cancel.clone(),
            fatal: self.fatal.clone(),
            fatal_reason: self.fatal_reason.clone(),
            activity: self.activity.clone(),
            events: self.events.clone(),
        }
    }
}

/// Main crawl coordinator
pub struct Coordinator<H: BrowserHost + 'static> {
    ctx: CrawlContext<H>,
}

impl<H: BrowserHost + 'static> Coordinator<H> {
    /// Creates a coordinator and the receiving end of its event stream
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration; its seed anchors the crawl
    /// * `host` - Browser-host implementation shared by all workers
    /// * `store` - Session store, possibly already holding a restored session
    /// * `cancel` - Stop flag; set it to stop dequeuing new tasks
    pub fn new(
        config: Arc<Config>,
        host: Arc<H>,
        store: Arc<Mutex<CaptureStore>>,
        cancel: Arc<AtomicBool>,
    ) -> Result<(Self, UnboundedReceiver<CrawlEvent>)> {
        let seed = config.seed()?;
        let (events, events_rx) = mpsc::unbounded_channel();

        let ctx = CrawlContext {
            config,
            seed,
            host,
            store,
            state: Arc::new(Mutex::new(CrawlState::new())),
            cancel,
            fatal: Arc::new(AtomicBool::new(false)),
            fatal_reason: Arc::new(Mutex::new(None)),
            activity: Arc::new(ActivityTracker::new()),
            events,
        };

        Ok((Coordinator { ctx }, events_rx))
    }

    /// Runs the crawl to completion
    ///
    /// Resolves once every worker has stopped: frontier drained,
    /// cancellation observed, or the control channel lost. The first two
    /// return an outcome; context loss returns the fatal error after the
    /// partial session has been persisted, so a later export can still
    /// pick it up.
    pub async fn run(&self) -> Result<CrawlOutcome> {
        let started = Instant::now();
        let workers = self.ctx.config.crawler.workers;
        let max_depth = self.ctx.config.crawler.max_depth;

        {
            let mut state = self.ctx.state.lock().unwrap();
            state.seed(self.ctx.seed.clone());
        }
        {
            let mut store = self.ctx.store.lock().unwrap();
            store.set_crawl_active(true);
        }

        tracing::debug!(seed = %self.ctx.seed, workers, max_depth, "starting crawl");
        send_event(
            &self.ctx.events,
            CrawlEvent::Started {
                seed: self.ctx.seed.clone(),
                max_depth,
                workers,
            },
        );

        let pump = tokio::spawn(pump_loop(self.ctx.clone()));
        let keep_alive = tokio::spawn(keep_alive_loop(self.ctx.clone()));

        let mut handles = Vec::with_capacity(workers);
        for worker in 0..workers {
            handles.push(tokio::spawn(worker_loop(worker, self.ctx.clone())));
        }
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "worker task panicked");
            }
        }

        pump.abort();
        keep_alive.abort();

        // final persist, then release the clear() guard
        let payload = { self.ctx.store.lock().unwrap().session_payload() };
        if let Err(e) = self.ctx.host.persist_state(SESSION_STATE_KEY, &payload).await {
            tracing::warn!(error = %e, "final session persist failed");
        }
        {
            let mut store = self.ctx.store.lock().unwrap();
            store.set_crawl_active(false);
        }

        if self.ctx.fatal.load(Ordering::Relaxed) {
            let reason = self
                .ctx
                .fatal_reason
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| "control channel lost".to_string());
            return Err(HostError::ContextLost(reason).into());
        }

        let outcome = self.outcome(started.elapsed());
        send_event(&self.ctx.events, CrawlEvent::Finished(outcome.clone()));
        Ok(outcome)
    }

    fn outcome(&self, elapsed: Duration) -> CrawlOutcome {
        let state = self.ctx.state.lock().unwrap();
        let store = self.ctx.store.lock().unwrap();
        CrawlOutcome {
            pages_captured: state.visited_count(),
            pages_failed: state.failed().len(),
            assets_captured: store.totals().total,
            bytes_captured: store.totals().bytes,
            retries: state.retry_counts().values().sum(),
            cancelled: self.ctx.cancel.load(Ordering::Relaxed),
            elapsed,
        }
    }
}

/// Forwards an event; a dropped listener never stops the crawl
fn send_event(tx: &UnboundedSender<CrawlEvent>, event: CrawlEvent) {
    let _ = tx.send(event);
}

/// One capture worker: dequeue, capture, discover, pace, repeat
async fn worker_loop<H: BrowserHost>(worker: usize, ctx: CrawlContext<H>) {
    loop {
        if ctx.fatal.load(Ordering::Relaxed) {
            tracing::debug!(worker, "stopping: control channel lost");
            return;
        }
        if ctx.cancel.load(Ordering::Relaxed) {
            tracing::debug!(worker, "stopping: cancellation requested");
            return;
        }

        let task = { ctx.state.lock().unwrap().begin() };
        let Some(task) = task else {
            if ctx.state.lock().unwrap().is_idle() {
                tracing::debug!(worker, "frontier drained");
                return;
            }
            tokio::time::sleep(WORKER_IDLE_POLL).await;
            continue;
        };

        process_task(worker, &ctx, task).await;

        tokio::time::sleep(politeness_delay(
            ctx.config.crawler.task_delay_ms,
            ctx.config.capture.stealth,
        ))
        .await;
    }
}

/// Captures one frontier task and classifies the result
async fn process_task<H: BrowserHost>(worker: usize, ctx: &CrawlContext<H>, task: FrontierTask) {
    tracing::debug!(
        worker,
        url = %task.url,
        depth = task.depth,
        retry = task.retry,
        "capturing page"
    );

    let agent = PageCaptureAgent::new(
        ctx.host.clone(),
        SettleDetector::new(ctx.activity.clone(), ctx.config.settle_policy()),
        ctx.config.capture_policy(),
    );

    match agent.capture_background(&task.url).await {
        Ok(snapshot) => {
            let cookies = match ctx.host.get_cookies(&task.url).await {
                Ok(cookies) => cookies,
                Err(e) if e.is_fatal() => {
                    abort_crawl(ctx, &e);
                    ctx.state.lock().unwrap().release();
                    return;
                }
                Err(e) => {
                    tracing::debug!(url = %task.url, error = %e, "cookie read failed");
                    Vec::new()
                }
            };

            let title = snapshot.title.clone();
            let links = snapshot.internal_links.clone();
            {
                let mut store = ctx.store.lock().unwrap();
                store.record_page(snapshot, cookies);
            }
            admit_discovered_links(ctx, &links, task.depth);

            send_event(
                &ctx.events,
                CrawlEvent::PageCaptured {
                    url: task.url.clone(),
                    depth: task.depth,
                    title,
                },
            );
            ctx.state.lock().unwrap().complete(&task);
        }
        Err(e) if e.is_fatal() => {
            abort_crawl(ctx, &e);
            ctx.state.lock().unwrap().release();
        }
        Err(e) => {
            let url = task.url.clone();
            let error = e.to_string();
            let decision = { ctx.state.lock().unwrap().retry_or_fail(task) };
            match decision {
                RetryDecision::Requeued(attempt) => {
                    send_event(&ctx.events, CrawlEvent::RetryScheduled { url, attempt, error });
                }
                RetryDecision::GaveUp => {
                    send_event(&ctx.events, CrawlEvent::PageFailed { url, error });
                }
            }
        }
    }
}

/// Filters a page's outbound links into new frontier tasks
///
/// Applies normalization, the strict same-origin policy, and the depth
/// ceiling; `CrawlState::admit` handles known-URL dedup.
fn admit_discovered_links<H: BrowserHost>(
    ctx: &CrawlContext<H>,
    links: &[String],
    parent_depth: u32,
) {
    let child_depth = parent_depth + 1;
    if child_depth > ctx.config.crawler.max_depth {
        return;
    }

    let mut state = ctx.state.lock().unwrap();
    for link in links {
        let url = match normalize_url(link) {
            Ok(url) => url,
            Err(e) => {
                tracing::trace!(link = %link, error = %e, "undiscoverable link");
                continue;
            }
        };
        if !is_same_origin(&ctx.seed, &url) {
            continue;
        }
        if state.admit(url.clone(), child_depth) {
            tracing::debug!(url = %url, depth = child_depth, "discovered page");
        }
    }
}

/// Marks the crawl fatally broken; every loop observes the flag and stops
fn abort_crawl<H: BrowserHost>(ctx: &CrawlContext<H>, error: &HostError) {
    if !ctx.fatal.swap(true, Ordering::Relaxed) {
        tracing::error!(error = %error, "browser context lost; aborting crawl");
        *ctx.fatal_reason.lock().unwrap() = Some(error.to_string());
    }
}

/// Drains completed network responses into the store on a short interval
///
/// Non-empty drains touch the activity clock, which is what settle
/// detection measures. The session is re-persisted whenever the store's
/// rate limit says one is due, and every couple of seconds the active
/// page's streamed-message tap is drained too.
async fn pump_loop<H: BrowserHost>(ctx: CrawlContext<H>) {
    let ticks_per_stream_drain = (STREAM_DRAIN_INTERVAL.as_millis()
        / NETWORK_PUMP_INTERVAL.as_millis())
    .max(1) as u32;
    let mut tick = 0u32;

    loop {
        if ctx.fatal.load(Ordering::Relaxed) {
            return;
        }
        tokio::time::sleep(NETWORK_PUMP_INTERVAL).await;
        tick = tick.wrapping_add(1);

        match ctx.host.drain_network_events().await {
            Ok(entries) if !entries.is_empty() => {
                ctx.activity.touch();
                let persist_due = {
                    let mut store = ctx.store.lock().unwrap();
                    for entry in entries {
                        store.record_request(entry);
                    }
                    store.persist_due()
                };
                if persist_due {
                    let payload = { ctx.store.lock().unwrap().session_payload() };
                    if let Err(e) = ctx.host.persist_state(SESSION_STATE_KEY, &payload).await {
                        tracing::warn!(error = %e, "periodic session persist failed");
                    }
                }
            }
            Ok(_) => {}
            Err(e) if e.is_fatal() => {
                abort_crawl(&ctx, &e);
                return;
            }
            Err(e) => tracing::debug!(error = %e, "network drain failed"),
        }

        if tick % ticks_per_stream_drain == 0 {
            drain_streamed_messages(&ctx).await;
        }
    }
}

/// Best-effort drain of the active page's streamed-message tap
async fn drain_streamed_messages<H: BrowserHost>(ctx: &CrawlContext<H>) {
    let tab = ctx.host.active_tab();
    let value = match ctx.host.evaluate_in_page(tab, SSE_DRAIN_SCRIPT).await {
        Ok(value) => value,
        Err(e) if e.is_fatal() => {
            abort_crawl(ctx, &e);
            return;
        }
        Err(e) => {
            tracing::trace!(error = %e, "stream drain failed");
            return;
        }
    };

    match serde_json::from_value::<Vec<StreamedMessage>>(value) {
        Ok(messages) if !messages.is_empty() => {
            ctx.store.lock().unwrap().record_streamed(messages);
        }
        Ok(_) => {}
        Err(e) => tracing::trace!(error = %e, "stream drain returned an unexpected shape"),
    }
}

/// Pings the host control channel; a lost context aborts the whole crawl,
/// any other ping failure is logged and tolerated
async fn keep_alive_loop<H: BrowserHost>(ctx: CrawlContext<H>) {
    loop {
        tokio::time::sleep(KEEP_ALIVE_INTERVAL).await;
        if ctx.fatal.load(Ordering::Relaxed) {
            return;
        }
        match ctx.host.ping().await {
            Ok(()) => tracing::trace!("keep-alive ping"),
            Err(e) if e.is_fatal() => {
                abort_crawl(&ctx, &e);
                return;
            }
            Err(e) => tracing::debug!(error = %e, "keep-alive ping failed"),
        }
    }
}

/// Pause after each task; stealth mode adds random jitter on top of the
/// configured base
fn politeness_delay(base_ms: u64, stealth: bool) -> Duration {
    if stealth {
        let jitter = rand::thread_rng().gen_range(0..=base_ms * 2);
        Duration::from_millis(base_ms + jitter)
    } else {
        Duration::from_millis(base_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_politeness_delay_is_fixed_without_stealth() {
        for _ in 0..10 {
            assert_eq!(politeness_delay(200, false), Duration::from_millis(200));
        }
    }

    #[test]
    fn test_politeness_delay_jitters_in_stealth() {
        for _ in 0..100 {
            let delay = politeness_delay(200, true);
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(600));
        }
    }

    #[test]
    fn test_zero_base_delay_is_allowed() {
        assert_eq!(politeness_delay(0, false), Duration::ZERO);
        assert_eq!(politeness_delay(0, true), Duration::ZERO);
    }
}
