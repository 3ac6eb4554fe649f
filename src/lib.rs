//! URL Downloader Library
//!
//! Fetches remote files over HTTP/HTTPS into local storage with safety
//! limits: URL validation, per-download deadlines and size caps, bounded
//! concurrency, and collision-free naming. A file only appears under its
//! final name once it has been fully written.
//!
//! # Architecture
//!
//! - [`parser`] - URL validation (scheme, length, syntax, optional host blocking)
//! - [`download`] - filename resolution, bounded fetcher, batch coordinator
//!   and the typed request service
//! - [`config`] - TOML-backed configuration with defaults

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod download;
pub mod parser;
#[cfg(test)]
pub(crate) mod test_support;
pub(crate) mod user_agent;

// Re-export commonly used types
pub use config::{ConfigError, DownloaderConfig, load_config_file, load_default_config};
pub use download::{
    BatchDownload, BatchLimits, BatchSummary, ConcurrencyPolicy, DownloadEngine, DownloadOutcome,
    DownloadRequest, DownloadService, EngineError, FailureKind, Fetch, FetchJob, HttpClient,
    SingleDownload,
};
pub use parser::{UrlRejection, UrlValidator, validate_url};
