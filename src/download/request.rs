//! Per-URL download request.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::constants::{BYTES_PER_MB, DEFAULT_MAX_SIZE_MB, DEFAULT_TIMEOUT_SECS};

/// One URL to download, with its destination and limits.
///
/// Built once with [`DownloadRequest::new`] and the `with_*` methods, then
/// read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    url: String,
    filename: Option<String>,
    output_dir: PathBuf,
    timeout: Duration,
    max_size_bytes: u64,
}

impl DownloadRequest {
    /// Creates a request with the default timeout and size cap.
    #[must_use]
    pub fn new(url: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            filename: None,
            output_dir: output_dir.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_size_bytes: DEFAULT_MAX_SIZE_MB * BYTES_PER_MB,
        }
    }

    /// Sets the caller-supplied filename hint.
    #[must_use]
    pub fn with_filename(mut self, filename: Option<String>) -> Self {
        self.filename = filename;
        self
    }

    /// Sets the deadline covering headers and body.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the size cap in bytes.
    #[must_use]
    pub fn with_max_size_bytes(mut self, max_size_bytes: u64) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }

    /// The URL as supplied by the caller.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The filename hint, if any.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// The target directory.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// The per-download deadline.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The size cap in bytes.
    #[must_use]
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_uses_defaults() {
        let req = DownloadRequest::new("https://example.com/a.txt", "/tmp/out");
        assert_eq!(req.url(), "https://example.com/a.txt");
        assert_eq!(req.filename(), None);
        assert_eq!(req.output_dir(), Path::new("/tmp/out"));
        assert_eq!(req.timeout(), Duration::from_secs(60));
        assert_eq!(req.max_size_bytes(), 500 * 1024 * 1024);
    }

    #[test]
    fn test_builders_override_defaults() {
        let req = DownloadRequest::new("https://example.com/a.txt", "out")
            .with_filename(Some("b.txt".to_string()))
            .with_timeout(Duration::from_millis(250))
            .with_max_size_bytes(1024);
        assert_eq!(req.filename(), Some("b.txt"));
        assert_eq!(req.timeout(), Duration::from_millis(250));
        assert_eq!(req.max_size_bytes(), 1024);
    }
}
