//! Concurrent HTTP download engine.
//!
//! The pieces, leaf first:
//!
//! - [`filename`] derives a safe, collision-free name per request
//! - [`HttpClient`] (the [`Fetch`] implementation) performs one bounded GET
//!   into a temp file and renames it into place
//! - [`DownloadEngine`] validates, names and fans a batch out to a fixed
//!   worker pool, collecting outcomes in input order
//! - [`DownloadService`] is the typed single/batch request surface
//!
//! # Example
//!
//! ```no_run
//! use url_downloader::config::DownloaderConfig;
//! use url_downloader::download::{BatchDownload, DownloadService};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = DownloadService::new(DownloaderConfig::default())?;
//! let summary = service
//!     .download_files(BatchDownload::new(["https://example.com/a.pdf"]))
//!     .await?;
//! for outcome in summary.outcomes() {
//!     println!("{}: {}", outcome.url(), outcome.is_success());
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod engine;
mod error;
pub mod filename;
mod outcome;
mod request;
mod service;

pub use client::{ExtensionInference, Fetch, FetchJob, HttpClient, TEMP_SUFFIX};
pub use constants::{
    BYTES_PER_MB, CONCURRENCY_CEILING, CONNECT_TIMEOUT_SECS, DEFAULT_CONCURRENCY,
    DEFAULT_MAX_SIZE_MB, DEFAULT_MAX_URLS_PER_BATCH, DEFAULT_TIMEOUT_SECS, MAX_MAX_SIZE_MB,
    MAX_REDIRECTS, MAX_TIMEOUT_SECS, MIN_MAX_SIZE_MB, MIN_TIMEOUT_SECS,
};
pub use engine::{BatchLimits, ConcurrencyPolicy, DownloadEngine, EngineError, MIN_CONCURRENCY};
pub use error::{DownloadError, redact_paths};
pub use filename::{NameReservations, ResolvedFilename, resolve_filename};
pub use outcome::{BatchSummary, DownloadOutcome, FailureKind};
pub use request::DownloadRequest;
pub use service::{BatchDownload, DownloadService, SingleDownload};
