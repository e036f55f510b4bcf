//! Utsushi: a website-to-archive cloner
//!
//! This crate crawls a site through a browser-host capability boundary,
//! snapshots each page's serialized DOM and storage, records network
//! responses, and assembles everything into a self-contained offline ZIP
//! with rewritten asset paths and mocked API responses.

pub mod agent;
pub mod archive;
pub mod capture;
pub mod config;
pub mod crawler;
pub mod host;
pub mod url;

use thiserror::Error;

/// Main error type for Utsushi operations
#[derive(Debug, Error)]
pub enum UtsushiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    UrlError(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Browser host error: {0}")]
    Host(#[from] host::HostError),

    #[error("Capture store error: {0}")]
    Store(#[from] capture::StoreError),

    #[error("Archive error: {0}")]
    Archive(#[from] archive::ArchiveError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for Utsushi operations
pub type Result<T> = std::result::Result<T, UtsushiError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use capture::{AssetKind, CaptureStore};
pub use config::Config;
pub use crawler::{crawl, Coordinator, CrawlEvent, CrawlOutcome};
pub use host::{BrowserHost, HostError, TabId};
pub use crate::url::normalize_url;
