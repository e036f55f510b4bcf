//! Browser-host capability boundary
//!
//! Everything the cloner needs from a browser lives behind the
//! [`BrowserHost`] trait: navigation, hidden tabs, in-page script
//! evaluation, cookies, a completed-response event stream, key-value
//! state, notifications, and file downloads. The crate ships one real
//! implementation, [`HttpHost`], which emulates the surface with plain
//! HTTP fetching so the pipeline runs without a browser attached.

mod http;
mod traits;

use thiserror::Error;

pub use http::{build_http_client, HttpHost};
pub use traits::BrowserHost;

/// Handle to a host-managed tab
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TabId(pub u32);

impl std::fmt::Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tab#{}", self.0)
    }
}

/// Errors crossing the capability boundary
///
/// Only [`HostError::ContextLost`] is fatal to a whole crawl; everything
/// else stays scoped to the operation (and its task) that failed.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("Browser control channel lost: {0}")]
    ContextLost(String),

    #[error("Timed out after {waited_ms}ms waiting for {what}")]
    Timeout { what: String, waited_ms: u64 },

    #[error("Script evaluation failed: {0}")]
    Script(String),

    #[error("{0} no longer exists")]
    TabGone(TabId),

    #[error("State persistence failed: {0}")]
    Persistence(String),

    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Host I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    /// Whether this error tears down the whole crawl rather than one task
    pub fn is_fatal(&self) -> bool {
        matches!(self, HostError::ContextLost(_))
    }
}

/// Result type alias for host operations
pub type HostResult<T> = std::result::Result<T, HostError>;
