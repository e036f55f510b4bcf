//! Page capture agent: scripts, serialization, settle detection
//!
//! # Components
//!
//! - `scripts`: the page-side script sources (snapshot, stealth, scroll,
//!   streamed-message tap)
//! - `snapshot`: the DOM serialization contract for static documents and
//!   snapshot payload parsing
//! - `settle`: network-idle settle detection
//! - `capture`: foreground/background capture flows

mod capture;
mod scripts;
mod settle;
mod snapshot;

pub use capture::{CapturePolicy, PageCaptureAgent};
pub use scripts::{scroll_script, SNAPSHOT_SCRIPT, SSE_DRAIN_SCRIPT, SSE_TAP_SCRIPT, STEALTH_SCRIPT};
pub use settle::{ActivityTracker, SettleDetector, SettleOutcome, SettlePolicy};
pub use snapshot::{parse_snapshot_payload, serialize_document, snapshot_from_document, VOID_ELEMENTS};
