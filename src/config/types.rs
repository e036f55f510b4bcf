use std::time::Duration;

use serde::Deserialize;

use crate::agent::{CapturePolicy, SettlePolicy};

/// Main configuration structure for Utsushi
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub capture: CaptureConfig,
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub settle: SettleConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub host: HostConfig,
}

impl Config {
    /// Settle detection timings as the policy the capture agent consumes
    pub fn settle_policy(&self) -> SettlePolicy {
        SettlePolicy {
            grace: Duration::from_millis(self.settle.grace_ms),
            idle: Duration::from_millis(self.settle.idle_ms),
            poll: Duration::from_millis(self.settle.poll_ms),
            max_wait: Duration::from_millis(self.settle.max_wait_ms),
        }
    }

    /// Per-capture behavior knobs for the page capture agent
    pub fn capture_policy(&self) -> CapturePolicy {
        CapturePolicy {
            stealth: self.capture.stealth,
            tab_load_timeout: Duration::from_millis(self.settle.tab_load_timeout_ms),
            background_settle: Duration::from_millis(self.settle.background_settle_ms),
        }
    }

    /// The normalized seed URL the crawl starts from
    pub fn seed(&self) -> crate::UrlResult<url::Url> {
        crate::url::normalize_url(&self.capture.seed_url)
    }
}

/// What to capture and how the target sees us
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// URL the crawl starts from; also anchors the origin filter
    #[serde(rename = "seed-url")]
    pub seed_url: String,

    /// Drop captured requests whose host is outside the seed's domain
    #[serde(rename = "same-origin-only", default = "default_same_origin_only")]
    pub same_origin_only: bool,

    /// Jitter task pacing and mask automation hints in the page
    #[serde(default)]
    pub stealth: bool,

    /// User-Agent header sent by the HTTP-backed host
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

/// Crawl scheduling configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum link distance from the seed page
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Number of concurrent capture workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Politeness pause after each task, in milliseconds
    ///
    /// Stealth mode adds a random jitter on top of this base.
    #[serde(rename = "task-delay-ms", default = "default_task_delay_ms")]
    pub task_delay_ms: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        CrawlerConfig {
            max_depth: default_max_depth(),
            workers: default_workers(),
            task_delay_ms: default_task_delay_ms(),
        }
    }
}

/// Settle detection timings, all in milliseconds
#[derive(Debug, Clone, Deserialize)]
pub struct SettleConfig {
    /// Unconditional wait after navigation before polling starts
    #[serde(rename = "grace-ms", default = "default_grace_ms")]
    pub grace_ms: u64,

    /// Network silence window that counts as settled
    #[serde(rename = "idle-ms", default = "default_idle_ms")]
    pub idle_ms: u64,

    /// Poll interval while waiting for the page to settle
    #[serde(rename = "poll-ms", default = "default_poll_ms")]
    pub poll_ms: u64,

    /// Hard ceiling on one settle wait
    #[serde(rename = "max-wait-ms", default = "default_max_wait_ms")]
    pub max_wait_ms: u64,

    /// Ceiling on a background tab reaching load-complete
    #[serde(rename = "tab-load-timeout-ms", default = "default_tab_load_timeout_ms")]
    pub tab_load_timeout_ms: u64,

    /// Fixed delay after a background tab reports load-complete
    #[serde(rename = "background-settle-ms", default = "default_background_settle_ms")]
    pub background_settle_ms: u64,
}

impl Default for SettleConfig {
    fn default() -> Self {
        SettleConfig {
            grace_ms: default_grace_ms(),
            idle_ms: default_idle_ms(),
            poll_ms: default_poll_ms(),
            max_wait_ms: default_max_wait_ms(),
            tab_load_timeout_ms: default_tab_load_timeout_ms(),
            background_settle_ms: default_background_settle_ms(),
        }
    }
}

/// Archive output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    /// Filename handed to the host download surface
    #[serde(rename = "output-path", default = "default_output_path")]
    pub output_path: String,

    /// Replace known analytics script tags with a removal comment
    #[serde(rename = "strip-analytics", default = "default_strip_analytics")]
    pub strip_analytics: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        ArchiveConfig {
            output_path: default_output_path(),
            strip_analytics: default_strip_analytics(),
        }
    }
}

/// HTTP-backed host configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    /// Directory for persisted key-value session state
    #[serde(rename = "state-dir", default = "default_state_dir")]
    pub state_dir: String,

    /// Directory finished archives are written into
    #[serde(rename = "download-dir", default = "default_download_dir")]
    pub download_dir: String,

    /// Total per-request timeout in seconds
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            state_dir: default_state_dir(),
            download_dir: default_download_dir(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_same_origin_only() -> bool {
    true
}

fn default_user_agent() -> String {
    format!("utsushi/{}", env!("CARGO_PKG_VERSION"))
}

fn default_max_depth() -> u32 {
    2
}

fn default_workers() -> usize {
    3
}

fn default_task_delay_ms() -> u64 {
    200
}

fn default_grace_ms() -> u64 {
    2_000
}

fn default_idle_ms() -> u64 {
    2_500
}

fn default_poll_ms() -> u64 {
    500
}

fn default_max_wait_ms() -> u64 {
    30_000
}

fn default_tab_load_timeout_ms() -> u64 {
    20_000
}

fn default_background_settle_ms() -> u64 {
    3_000
}

fn default_output_path() -> String {
    "site-clone.zip".to_string()
}

fn default_strip_analytics() -> bool {
    true
}

fn default_state_dir() -> String {
    ".utsushi/state".to_string()
}

fn default_download_dir() -> String {
    ".".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}
