//! Constants for the download module (timeouts, size and batch limits).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Maximum number of redirects followed for one request.
pub const MAX_REDIRECTS: usize = 10;

/// Default per-download deadline in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Smallest accepted per-download deadline in seconds.
pub const MIN_TIMEOUT_SECS: u64 = 1;

/// Largest accepted per-download deadline in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 300;

/// Default size cap per download in megabytes.
pub const DEFAULT_MAX_SIZE_MB: u64 = 500;

/// Smallest accepted size cap in megabytes.
pub const MIN_MAX_SIZE_MB: u64 = 1;

/// Largest accepted size cap in megabytes.
pub const MAX_MAX_SIZE_MB: u64 = 5000;

/// Bytes per megabyte used when converting size caps.
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Default number of simultaneous fetches in a batch.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// Hard ceiling on simultaneous fetches, regardless of configuration.
pub const CONCURRENCY_CEILING: usize = 50;

/// Default maximum number of URLs accepted in one batch.
pub const DEFAULT_MAX_URLS_PER_BATCH: usize = 100;
