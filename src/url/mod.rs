//! URL handling module for Utsushi
//!
//! This module provides discovery-time URL normalization, origin
//! comparison, and slug/filename derivation for archive paths.

mod files;
mod normalize;

// Re-export main functions
pub use files::{extension_from_path, file_stem, page_slug, url_hash};
pub use normalize::{is_same_origin, normalize_url};
