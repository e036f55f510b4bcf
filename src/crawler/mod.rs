//! Crawler module for concurrent page capture
//!
//! This module contains the crawl scheduling logic, including:
//! - The FIFO frontier with known/visited bookkeeping and retry caps
//! - The fixed-size worker pool that drives page captures
//! - The network pump and keep-alive side loops
//! - Progress events for live status reporting

mod coordinator;
mod frontier;

pub use coordinator::{Coordinator, CrawlEvent, CrawlOutcome};
pub use frontier::{CrawlState, FrontierTask, RetryDecision, MAX_TASK_RETRIES};

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use crate::capture::CaptureStore;
use crate::config::Config;
use crate::host::BrowserHost;
use crate::{Result, UtsushiError};

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Seed the frontier from the configured URL
/// 2. Spawn the capture workers plus the network pump and keep-alive loops
/// 3. Record page snapshots and network responses into the store
/// 4. Forward progress events to the log
/// 5. Persist the session and report the final outcome
///
/// Callers that need the raw event stream (live UIs, scenario tests)
/// should construct a [`Coordinator`] directly.
///
/// # Arguments
///
/// * `config` - Validated crawl configuration
/// * `host` - Browser-host implementation shared by all workers
/// * `store` - Session store, possibly holding a restored session
/// * `cancel` - Cooperative stop flag
///
/// # Returns
///
/// * `Ok(CrawlOutcome)` - Crawl drained or was cancelled; summary counts
/// * `Err(UtsushiError)` - The host control channel was lost
pub async fn crawl<H: BrowserHost + 'static>(
    config: Arc<Config>,
    host: Arc<H>,
    store: Arc<Mutex<CaptureStore>>,
    cancel: Arc<AtomicBool>,
) -> Result<CrawlOutcome> {
    let (coordinator, mut events) = Coordinator::new(config, host, store, cancel)?;
    let run = tokio::spawn(async move { coordinator.run().await });

    // A fatal abort never sends Finished; the channel closing covers it.
    while let Some(event) = events.recv().await {
        let finished = matches!(event, CrawlEvent::Finished(_));
        log_event(&event);
        if finished {
            break;
        }
    }

    match run.await {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = %e, "crawl task panicked");
            Err(UtsushiError::Io(std::io::Error::other(
                "crawl task panicked",
            )))
        }
    }
}

/// Logs one progress event at the level its severity warrants
fn log_event(event: &CrawlEvent) {
    match event {
        CrawlEvent::Started {
            seed,
            max_depth,
            workers,
        } => {
            tracing::info!(seed = %seed, max_depth, workers, "crawl started");
        }
        CrawlEvent::PageCaptured { url, depth, title } => {
            tracing::info!(url = %url, depth, title = %title, "page captured");
        }
        CrawlEvent::RetryScheduled {
            url,
            attempt,
            error,
        } => {
            tracing::warn!(url = %url, attempt, error = %error, "capture failed; retry scheduled");
        }
        CrawlEvent::PageFailed { url, error } => {
            tracing::warn!(url = %url, error = %error, "page failed permanently");
        }
        CrawlEvent::Finished(outcome) => {
            tracing::info!(
                pages = outcome.pages_captured,
                failed = outcome.pages_failed,
                assets = outcome.assets_captured,
                retries = outcome.retries,
                cancelled = outcome.cancelled,
                "crawl finished"
            );
        }
    }
}
