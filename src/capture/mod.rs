//! Capture module: classification, record types, and the session store
//!
//! # Components
//!
//! - `classify`: pure resource classification and the request skip policy
//! - `types`: captured request / page snapshot / cookie / totals records
//! - `store`: the deduplicating session ledger everything is recorded into

mod classify;
mod store;
mod types;

// Re-export main types
pub use classify::{classify, should_skip_url, AssetKind};
pub use store::{CaptureStore, StoreError, SESSION_STATE_KEY};
pub use types::{
    AssetTotals, CapturedRequest, Cookie, PageSnapshot, StorageSnapshot, StreamedMessage,
};
