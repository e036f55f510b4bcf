//! Offline archive assembly
//!
//! Turns a populated capture store into one self-contained ZIP: page
//! snapshots under `pages/`, captured assets under per-category `assets/`
//! folders, captured API responses doubled into a mock dataset answered by
//! an injected handler script, and every captured URL rewritten to its
//! local path.
//!
//! # Components
//!
//! - `paths`: URL to archive-local path mapping
//! - `rewrite`: longest-match-first URL substitution plus HTML surgery
//! - `runtime`: scripts and synthesized files embedded in every archive
//! - `assembler`: ZIP bundle construction

mod assembler;
mod paths;
mod rewrite;
mod runtime;

pub use assembler::{ArchiveBundle, ArchiveSummary, Assembler};
pub use paths::{AssetMap, MappedAsset};
pub use rewrite::Rewriter;
pub use runtime::{
    combined_styles, COMBINED_STYLES_PATH, MOCK_DATA_PATH, MOCK_HANDLER_JS, MOCK_HANDLER_PATH,
};

use thiserror::Error;

/// Archive assembly errors
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Nothing captured yet; run a crawl or snapshot first")]
    EmptyStore,

    #[error("Failed to build the URL rewrite pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Failed to serialize archive metadata: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to write ZIP entry: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error while assembling the archive: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for archive operations
pub type ArchiveResult<T> = std::result::Result<T, ArchiveError>;
