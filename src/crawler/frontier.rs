//! Frontier queue and shared crawl bookkeeping
//!
//! This module tracks:
//! - The FIFO frontier of pages waiting to be captured
//! - Which URLs are already known, so each page is enqueued at most once
//! - Which URLs finished successfully and which gave up after retries
//! - How many tasks are in flight, so workers know when the crawl is done
//!
//! Pages are captured in arrival order: the seed first, then everything
//! found at depth 1, then depth 2, and so on. Every URL in here is
//! normalized, so lookups and the visited set never see two spellings of
//! the same page.

use std::collections::{HashMap, HashSet, VecDeque};

use url::Url;

/// How many times a failed capture is requeued before giving up
///
/// A task runs at most `MAX_TASK_RETRIES + 1` times.
pub const MAX_TASK_RETRIES: u32 = 2;

/// One page waiting in the frontier
#[derive(Debug, Clone)]
pub struct FrontierTask {
    /// Normalized page URL
    pub url: Url,

    /// Link distance from the seed page
    pub depth: u32,

    /// How many times this task has already been requeued
    pub retry: u32,
}

impl FrontierTask {
    /// The normalized string key this task is tracked under
    pub fn key(&self) -> &str {
        self.url.as_str()
    }
}

/// What happened to a task that reported failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Requeued at the back of the frontier with the given retry count
    Requeued(u32),
    /// Retries exhausted; the URL moved to the failed list
    GaveUp,
}

/// Shared ledger of one crawl's progress
///
/// Lives behind a mutex shared by all workers. Every task popped with
/// [`CrawlState::begin`] must be closed out with exactly one of
/// [`CrawlState::complete`], [`CrawlState::retry_or_fail`], or
/// [`CrawlState::release`], which keeps the in-flight count honest and
/// lets idle workers detect termination.
///
/// Invariant: `visited` is always a subset of `known`, because a URL only
/// reaches the frontier through [`CrawlState::seed`] or
/// [`CrawlState::admit`], both of which record it as known first.
#[derive(Debug, Default)]
pub struct CrawlState {
    /// Pages waiting to be captured, in discovery order
    frontier: VecDeque<FrontierTask>,

    /// Every normalized URL ever enqueued
    known: HashSet<String>,

    /// Normalized URLs whose capture succeeded
    visited: HashSet<String>,

    /// Normalized URLs that exhausted their retries, in failure order
    failed: Vec<String>,

    /// Requeue counts for URLs that failed at least once
    retry_counts: HashMap<String, u32>,

    /// Tasks currently held by workers
    in_flight: usize,
}

impl CrawlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues the seed page at depth 0
    pub fn seed(&mut self, url: Url) {
        if self.known.insert(url.as_str().to_string()) {
            self.frontier.push_back(FrontierTask {
                url,
                depth: 0,
                retry: 0,
            });
        }
    }

    /// Enqueues a discovered page unless its URL is already known
    ///
    /// # Arguments
    ///
    /// * `url` - Normalized URL of the discovered page
    /// * `depth` - Link distance of the discovered page (parent depth + 1)
    ///
    /// # Returns
    ///
    /// Whether the page was admitted to the frontier
    pub fn admit(&mut self, url: Url, depth: u32) -> bool {
        if !self.known.insert(url.as_str().to_string()) {
            return false;
        }
        self.frontier.push_back(FrontierTask {
            url,
            depth,
            retry: 0,
        });
        true
    }

    /// Pops the next task and marks it in flight
    ///
    /// `None` means the frontier is empty right now; the crawl is only
    /// over once [`CrawlState::is_idle`] also reports no tasks in flight,
    /// since a running task may still discover new pages.
    pub fn begin(&mut self) -> Option<FrontierTask> {
        let task = self.frontier.pop_front()?;
        self.in_flight += 1;
        Some(task)
    }

    /// Closes out a task whose capture succeeded
    pub fn complete(&mut self, task: &FrontierTask) {
        self.visited.insert(task.key().to_string());
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Closes out a failed task, requeueing it if retries remain
    pub fn retry_or_fail(&mut self, task: FrontierTask) -> RetryDecision {
        self.in_flight = self.in_flight.saturating_sub(1);
        if task.retry >= MAX_TASK_RETRIES {
            self.failed.push(task.key().to_string());
            return RetryDecision::GaveUp;
        }

        let retry = task.retry + 1;
        *self.retry_counts.entry(task.key().to_string()).or_insert(0) += 1;
        self.frontier.push_back(FrontierTask {
            url: task.url,
            depth: task.depth,
            retry,
        });
        RetryDecision::Requeued(retry)
    }

    /// Closes out a task without recording an outcome
    ///
    /// Used when the crawl aborts mid-task (context loss) and the task is
    /// neither a success nor a counted failure.
    pub fn release(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Whether the crawl has nothing queued and nothing running
    pub fn is_idle(&self) -> bool {
        self.frontier.is_empty() && self.in_flight == 0
    }

    /// Number of pages waiting in the frontier
    pub fn queued(&self) -> usize {
        self.frontier.len()
    }

    /// Number of tasks currently held by workers
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Number of distinct URLs ever enqueued
    pub fn known_count(&self) -> usize {
        self.known.len()
    }

    /// Number of successfully captured pages
    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    /// Whether a normalized URL has been captured successfully
    pub fn is_visited(&self, key: &str) -> bool {
        self.visited.contains(key)
    }

    /// URLs that exhausted their retries, in failure order
    pub fn failed(&self) -> &[String] {
        &self.failed
    }

    /// Requeue counts for URLs that failed at least once
    pub fn retry_counts(&self) -> &HashMap<String, u32> {
        &self.retry_counts
    }
}
