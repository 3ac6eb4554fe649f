//! Typed single and batch download requests.
//!
//! [`DownloadService`] applies configuration defaults, enforces request-level
//! limits and the allowed output roots, then hands the work to the
//! [`DownloadEngine`].

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, instrument};

use super::client::{Fetch, HttpClient};
use super::constants::{
    BYTES_PER_MB, MAX_MAX_SIZE_MB, MAX_TIMEOUT_SECS, MIN_MAX_SIZE_MB, MIN_TIMEOUT_SECS,
};
use super::engine::{BatchLimits, DownloadEngine, EngineError};
use super::outcome::{BatchSummary, DownloadOutcome, FailureKind};
use super::request::DownloadRequest;
use crate::config::DownloaderConfig;
use crate::parser::UrlValidator;

/// Request to download one URL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SingleDownload {
    /// URL to fetch.
    pub url: String,
    /// Target directory; the configured default when absent.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Filename hint.
    #[serde(default)]
    pub filename: Option<String>,
    /// Deadline in seconds; the configured default when absent.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Size cap in MB; the configured default when absent.
    #[serde(default)]
    pub max_size_mb: Option<u64>,
}

impl SingleDownload {
    /// Creates a request for `url` with every option defaulted.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// Request to download many URLs into one directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchDownload {
    /// URLs to fetch, in result order.
    pub urls: Vec<String>,
    /// Shared target directory; the configured default when absent.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Per-download deadline in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Per-download size cap in MB.
    #[serde(default)]
    pub max_size_mb: Option<u64>,
    /// Simultaneous downloads; `max_concurrency` when absent.
    #[serde(default)]
    pub concurrency: Option<usize>,
}

impl BatchDownload {
    /// Creates a batch request with every option defaulted.
    #[must_use]
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            urls: urls.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }
}

/// Entry point for typed download requests.
#[derive(Debug)]
pub struct DownloadService {
    config: DownloaderConfig,
    engine: DownloadEngine,
}

impl DownloadService {
    /// Builds a service backed by a real [`HttpClient`].
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::HttpClient`] if the HTTP client cannot be built.
    pub fn new(config: DownloaderConfig) -> Result<Self, EngineError> {
        let client =
            HttpClient::with_connect_timeout(Duration::from_secs(config.connect_timeout_secs))
                .map_err(|source| EngineError::HttpClient { source })?;
        Ok(Self::with_fetcher(config, Arc::new(client)))
    }

    /// Builds a service around any fetcher.
    #[must_use]
    pub fn with_fetcher(config: DownloaderConfig, fetcher: Arc<dyn Fetch>) -> Self {
        let validator = UrlValidator::new(config.max_url_length)
            .with_private_host_blocking(config.block_private_hosts);
        let limits = BatchLimits {
            max_concurrency: config.max_concurrency,
            max_urls_per_batch: config.max_urls_per_batch,
            concurrency_policy: config.concurrency_policy,
        };
        let engine = DownloadEngine::new(fetcher, validator, limits);
        Self { config, engine }
    }

    /// The effective configuration.
    #[must_use]
    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Downloads one URL.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] when the timeout or size cap is out of range or
    /// the output directory is outside the allowed roots. Download failures
    /// are reported in the returned outcome.
    #[instrument(skip(self, request), fields(url = %request.url))]
    pub async fn download_single(
        &self,
        request: SingleDownload,
    ) -> Result<DownloadOutcome, EngineError> {
        let output_dir = self.resolve_output_dir(request.output_dir.as_deref())?;
        let timeout = self.timeout(request.timeout_secs)?;
        let max_size_bytes = self.max_size_bytes(request.max_size_mb)?;

        let url = request.url.clone();
        let download = DownloadRequest::new(request.url, output_dir)
            .with_filename(request.filename)
            .with_timeout(timeout)
            .with_max_size_bytes(max_size_bytes);

        let summary = self.engine.download_batch(vec![download], 1).await?;
        Ok(summary.into_outcomes().into_iter().next().unwrap_or_else(|| {
            DownloadOutcome::failure(url, FailureKind::NetworkError, "no outcome produced")
        }))
    }

    /// Downloads many URLs into one directory.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] before any work starts for request-level
    /// problems: too many URLs, rejected concurrency, out-of-range timeout or
    /// size cap, or a disallowed output directory.
    #[instrument(skip(self, request), fields(count = request.urls.len()))]
    pub async fn download_files(&self, request: BatchDownload) -> Result<BatchSummary, EngineError> {
        let max_urls = self.engine.limits().max_urls_per_batch;
        if request.urls.len() > max_urls {
            return Err(EngineError::too_many_urls(request.urls.len(), max_urls));
        }
        let concurrency = request
            .concurrency
            .unwrap_or(self.engine.limits().max_concurrency);
        let concurrency = self.engine.effective_concurrency(concurrency)?;
        let output_dir = self.resolve_output_dir(request.output_dir.as_deref())?;
        let timeout = self.timeout(request.timeout_secs)?;
        let max_size_bytes = self.max_size_bytes(request.max_size_mb)?;

        let downloads = request
            .urls
            .into_iter()
            .map(|url| {
                DownloadRequest::new(url, output_dir.clone())
                    .with_timeout(timeout)
                    .with_max_size_bytes(max_size_bytes)
            })
            .collect();

        self.engine.download_batch(downloads, concurrency).await
    }

    fn timeout(&self, requested: Option<u64>) -> Result<Duration, EngineError> {
        let secs = requested.unwrap_or(self.config.default_timeout_secs);
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&secs) {
            return Err(EngineError::invalid_timeout(
                secs,
                MIN_TIMEOUT_SECS,
                MAX_TIMEOUT_SECS,
            ));
        }
        Ok(Duration::from_secs(secs))
    }

    fn max_size_bytes(&self, requested: Option<u64>) -> Result<u64, EngineError> {
        let mb = requested.unwrap_or(self.config.default_max_size_mb);
        if !(MIN_MAX_SIZE_MB..=MAX_MAX_SIZE_MB).contains(&mb) {
            return Err(EngineError::invalid_max_size(
                mb,
                MIN_MAX_SIZE_MB,
                MAX_MAX_SIZE_MB,
            ));
        }
        Ok(mb * BYTES_PER_MB)
    }

    /// Makes the directory absolute, folds `.`/`..`, and checks the allowed roots.
    fn resolve_output_dir(&self, requested: Option<&Path>) -> Result<PathBuf, EngineError> {
        let dir = requested.unwrap_or(&self.config.default_output_dir);
        let absolute = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            std::env::current_dir()
                .map_err(|source| EngineError::CurrentDir { source })?
                .join(dir)
        };
        let normalized = normalize_lexically(&absolute);

        let roots = &self.config.allowed_output_roots;
        if !roots.is_empty()
            && !roots
                .iter()
                .any(|root| normalized.starts_with(normalize_lexically(root)))
        {
            return Err(EngineError::output_dir_not_allowed(normalized));
        }

        debug!(dir = %normalized.display(), "resolved output directory");
        Ok(normalized)
    }
}

/// Resolves `.` and `..` components without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() && !out.has_root() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use crate::download::FetchJob;

    /// Records the job it was given and reports success at the target path.
    #[derive(Debug, Default)]
    struct EchoFetcher {
        jobs: std::sync::Mutex<Vec<FetchJob>>,
    }

    #[async_trait]
    impl Fetch for EchoFetcher {
        async fn fetch(&self, job: &FetchJob) -> DownloadOutcome {
            self.jobs.lock().unwrap().push(job.clone());
            DownloadOutcome::success(job.url.as_str(), job.target_path(), 0, Duration::ZERO)
        }
    }

    fn service(config: DownloaderConfig) -> (DownloadService, Arc<EchoFetcher>) {
        let fetcher = Arc::new(EchoFetcher::default());
        let svc = DownloadService::with_fetcher(config, Arc::clone(&fetcher) as Arc<dyn Fetch>);
        (svc, fetcher)
    }

    fn config_in(dir: &TempDir) -> DownloaderConfig {
        DownloaderConfig {
            default_output_dir: dir.path().to_path_buf(),
            ..DownloaderConfig::default()
        }
    }

    #[tokio::test]
    async fn test_single_applies_defaults() {
        let dir = TempDir::new().unwrap();
        let (svc, fetcher) = service(config_in(&dir));

        let outcome = svc
            .download_single(SingleDownload::new("https://example.com/a.pdf"))
            .await
            .unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.path().unwrap(), dir.path().join("a.pdf"));

        let jobs = fetcher.jobs.lock().unwrap();
        assert_eq!(jobs[0].timeout, Duration::from_secs(60));
        assert_eq!(jobs[0].max_size_bytes, 500 * BYTES_PER_MB);
    }

    #[tokio::test]
    async fn test_single_uses_filename_and_limits() {
        let dir = TempDir::new().unwrap();
        let (svc, fetcher) = service(config_in(&dir));

        let request = SingleDownload {
            url: "https://example.com/x".to_string(),
            filename: Some("report.pdf".to_string()),
            timeout_secs: Some(5),
            max_size_mb: Some(2),
            ..SingleDownload::default()
        };
        let outcome = svc.download_single(request).await.unwrap();
        assert_eq!(outcome.file_name(), Some("report.pdf"));

        let jobs = fetcher.jobs.lock().unwrap();
        assert_eq!(jobs[0].timeout, Duration::from_secs(5));
        assert_eq!(jobs[0].max_size_bytes, 2 * BYTES_PER_MB);
    }

    #[tokio::test]
    async fn test_single_invalid_url_is_outcome_not_error() {
        let dir = TempDir::new().unwrap();
        let (svc, _) = service(config_in(&dir));

        let outcome = svc
            .download_single(SingleDownload::new("javascript:alert(1)"))
            .await
            .unwrap();
        assert_eq!(outcome.failure_kind(), Some(FailureKind::ValidationError));
    }

    #[tokio::test]
    async fn test_timeout_and_size_ranges_enforced() {
        let dir = TempDir::new().unwrap();
        let (svc, fetcher) = service(config_in(&dir));

        let cases = [
            (Some(0), None),
            (Some(301), None),
            (None, Some(0)),
            (None, Some(5001)),
        ];
        for (timeout_secs, max_size_mb) in cases {
            let request = SingleDownload {
                timeout_secs,
                max_size_mb,
                ..SingleDownload::new("https://example.com/a")
            };
            let err = svc.download_single(request).await.unwrap_err();
            assert!(
                matches!(
                    err,
                    EngineError::InvalidTimeout { .. } | EngineError::InvalidMaxSize { .. }
                ),
                "unexpected error: {err}"
            );
        }
        assert!(fetcher.jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_rejects_too_many_urls() {
        let dir = TempDir::new().unwrap();
        let (svc, _) = service(config_in(&dir));

        let urls: Vec<String> = (0..101).map(|i| format!("https://example.com/{i}")).collect();
        let err = svc.download_files(BatchDownload::new(urls)).await.unwrap_err();
        assert!(
            err.to_string().contains("Maximum 100 URLs"),
            "unexpected error: {err}"
        );
    }

    #[tokio::test]
    async fn test_batch_defaults_concurrency_to_max() {
        let dir = TempDir::new().unwrap();
        let (svc, fetcher) = service(config_in(&dir));

        let summary = svc
            .download_files(BatchDownload::new([
                "https://example.com/a.txt",
                "https://example.com/b.txt",
            ]))
            .await
            .unwrap();
        assert_eq!(summary.success_count(), 2);
        assert_eq!(fetcher.jobs.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_output_dir_outside_allowed_roots_rejected() {
        let allowed = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        let config = DownloaderConfig {
            allowed_output_roots: vec![allowed.path().to_path_buf()],
            ..config_in(&allowed)
        };
        let (svc, fetcher) = service(config);

        let outside = SingleDownload {
            output_dir: Some(other.path().to_path_buf()),
            ..SingleDownload::new("https://example.com/a")
        };
        let err = svc.download_single(outside).await.unwrap_err();
        assert!(matches!(err, EngineError::OutputDirNotAllowed { .. }), "unexpected: {err}");

        let escape = SingleDownload {
            output_dir: Some(allowed.path().join("sub").join("..").join("..")),
            ..SingleDownload::new("https://example.com/a")
        };
        let err = svc.download_single(escape).await.unwrap_err();
        assert!(matches!(err, EngineError::OutputDirNotAllowed { .. }), "unexpected: {err}");

        let inside = SingleDownload {
            output_dir: Some(allowed.path().join("nested")),
            ..SingleDownload::new("https://example.com/a")
        };
        assert!(svc.download_single(inside).await.unwrap().is_success());
        assert_eq!(fetcher.jobs.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_normalize_lexically() {
        assert_eq!(
            normalize_lexically(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
        assert_eq!(normalize_lexically(Path::new("/a/../..")), PathBuf::from("/"));
    }

    #[test]
    fn test_requests_deserialize_from_json() {
        let single: SingleDownload = serde_json::from_str(
            r#"{"url":"https://example.com/a","filename":"a.txt","timeout_secs":10}"#,
        )
        .unwrap();
        assert_eq!(single.filename.as_deref(), Some("a.txt"));
        assert_eq!(single.timeout_secs, Some(10));

        let batch: BatchDownload =
            serde_json::from_str(r#"{"urls":["https://a/1","https://a/2"],"concurrency":3}"#).unwrap();
        assert_eq!(batch.urls.len(), 2);
        assert_eq!(batch.concurrency, Some(3));

        assert!(serde_json::from_str::<SingleDownload>(r#"{"url":"x","extra":1}"#).is_err());
    }
}
