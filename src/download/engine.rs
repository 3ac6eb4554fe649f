//! Download coordinator: fans a batch out to a fetcher under a concurrency limit.
//!
//! A batch runs in three phases:
//!
//! 1. **Validation** of every URL, in input order. Rejections become
//!    [`FailureKind::ValidationError`] outcomes and never reach a worker.
//! 2. **Naming** on the calling task: target directories are created and each
//!    surviving request gets a reserved, collision-free filename.
//! 3. **Dispatch** to a fixed pool of workers draining a shared queue. Each
//!    worker runs one fetch end-to-end before taking the next, and writes the
//!    outcome into the slot matching the request's input index.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use url_downloader::download::{BatchLimits, DownloadEngine, DownloadRequest, HttpClient};
//! use url_downloader::parser::UrlValidator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = DownloadEngine::new(
//!     Arc::new(HttpClient::new()),
//!     UrlValidator::default(),
//!     BatchLimits::default(),
//! );
//! let requests = vec![DownloadRequest::new("https://example.com/a.pdf", "./downloads")];
//! let summary = engine.download_batch(requests, 4).await?;
//! println!("ok: {}, failed: {}", summary.success_count(), summary.failed_count());
//! # Ok(())
//! # }
//! ```

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::client::{Fetch, FetchJob};
use super::constants::{CONCURRENCY_CEILING, DEFAULT_CONCURRENCY, DEFAULT_MAX_URLS_PER_BATCH};
use super::error::redact_paths;
use super::filename::NameReservations;
use super::outcome::{BatchSummary, DownloadOutcome, FailureKind};
use super::request::DownloadRequest;
use crate::parser::UrlValidator;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Request-level errors returned before any download starts.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Concurrency limit outside the accepted range.
    #[error("concurrency must be between 1 and {max}, got {value}")]
    InvalidConcurrency {
        /// The requested value.
        value: usize,
        /// The configured maximum.
        max: usize,
    },

    /// Batch larger than the configured maximum.
    #[error("Maximum {max} URLs allowed per request, got {count}")]
    TooManyUrls {
        /// Number of URLs submitted.
        count: usize,
        /// The configured maximum.
        max: usize,
    },

    /// Per-download timeout outside the accepted range.
    #[error("timeout must be between {min} and {max} seconds, got {value}")]
    InvalidTimeout {
        /// The requested value in seconds.
        value: u64,
        /// Smallest accepted value.
        min: u64,
        /// Largest accepted value.
        max: u64,
    },

    /// Size cap outside the accepted range.
    #[error("max size must be between {min} and {max} MB, got {value}")]
    InvalidMaxSize {
        /// The requested value in megabytes.
        value: u64,
        /// Smallest accepted value.
        min: u64,
        /// Largest accepted value.
        max: u64,
    },

    /// Output directory is not under any allowed root.
    #[error("output directory is not within the allowed locations")]
    OutputDirNotAllowed {
        /// The rejected directory.
        path: PathBuf,
    },

    /// The current directory could not be determined to resolve a relative path.
    #[error("cannot resolve relative output directory: {source}")]
    CurrentDir {
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The shared HTTP client could not be built.
    #[error("failed to build HTTP client: {source}")]
    HttpClient {
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },
}

impl EngineError {
    /// Creates an invalid concurrency error.
    #[must_use]
    pub fn invalid_concurrency(value: usize, max: usize) -> Self {
        Self::InvalidConcurrency { value, max }
    }

    /// Creates a too-many-URLs error.
    #[must_use]
    pub fn too_many_urls(count: usize, max: usize) -> Self {
        Self::TooManyUrls { count, max }
    }

    /// Creates an invalid timeout error.
    #[must_use]
    pub fn invalid_timeout(value: u64, min: u64, max: u64) -> Self {
        Self::InvalidTimeout { value, min, max }
    }

    /// Creates an invalid size cap error.
    #[must_use]
    pub fn invalid_max_size(value: u64, min: u64, max: u64) -> Self {
        Self::InvalidMaxSize { value, min, max }
    }

    /// Creates an output-directory-not-allowed error.
    #[must_use]
    pub fn output_dir_not_allowed(path: impl Into<PathBuf>) -> Self {
        Self::OutputDirNotAllowed { path: path.into() }
    }
}

/// What to do with a requested concurrency outside `1..=max_concurrency`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyPolicy {
    /// Fail the request with [`EngineError::InvalidConcurrency`].
    #[default]
    Reject,
    /// Silently bring the value into range.
    Clamp,
}

/// Batch-wide limits enforced before any work starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    /// Largest accepted concurrency; never above [`CONCURRENCY_CEILING`].
    pub max_concurrency: usize,
    /// Largest accepted batch.
    pub max_urls_per_batch: usize,
    /// Handling of out-of-range concurrency.
    pub concurrency_policy: ConcurrencyPolicy,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_CONCURRENCY,
            max_urls_per_batch: DEFAULT_MAX_URLS_PER_BATCH,
            concurrency_policy: ConcurrencyPolicy::Reject,
        }
    }
}

/// Concurrent batch downloader.
///
/// Holds the shared fetcher, the URL validator and the batch limits. One
/// engine can serve any number of sequential or concurrent batches.
pub struct DownloadEngine {
    fetcher: Arc<dyn Fetch>,
    validator: UrlValidator,
    limits: BatchLimits,
}

impl fmt::Debug for DownloadEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadEngine")
            .field("validator", &self.validator)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

type WorkQueue = Arc<Mutex<VecDeque<(usize, FetchJob)>>>;

impl DownloadEngine {
    /// Creates an engine. `limits.max_concurrency` is capped at
    /// [`CONCURRENCY_CEILING`] and raised to at least [`MIN_CONCURRENCY`].
    #[must_use]
    pub fn new(fetcher: Arc<dyn Fetch>, validator: UrlValidator, mut limits: BatchLimits) -> Self {
        limits.max_concurrency = limits
            .max_concurrency
            .clamp(MIN_CONCURRENCY, CONCURRENCY_CEILING);
        Self {
            fetcher,
            validator,
            limits,
        }
    }

    /// Returns the effective batch limits.
    #[must_use]
    pub fn limits(&self) -> BatchLimits {
        self.limits
    }

    /// Applies the concurrency policy to a requested limit.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] when the value is out of
    /// range and the policy is [`ConcurrencyPolicy::Reject`].
    pub fn effective_concurrency(&self, requested: usize) -> Result<usize, EngineError> {
        let max = self.limits.max_concurrency;
        if (MIN_CONCURRENCY..=max).contains(&requested) {
            return Ok(requested);
        }
        match self.limits.concurrency_policy {
            ConcurrencyPolicy::Reject => Err(EngineError::invalid_concurrency(requested, max)),
            ConcurrencyPolicy::Clamp => {
                let clamped = requested.clamp(MIN_CONCURRENCY, max);
                debug!(requested, clamped, "clamped concurrency");
                Ok(clamped)
            }
        }
    }

    /// Downloads every request and returns one outcome per request, in input order.
    ///
    /// Per-URL failures are reported inside the summary; they never fail the batch.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] before any work starts when the batch exceeds
    /// `max_urls_per_batch` or the concurrency is rejected.
    #[instrument(skip(self, requests), fields(count = requests.len()))]
    pub async fn download_batch(
        &self,
        requests: Vec<DownloadRequest>,
        concurrency: usize,
    ) -> Result<BatchSummary, EngineError> {
        if requests.len() > self.limits.max_urls_per_batch {
            return Err(EngineError::too_many_urls(
                requests.len(),
                self.limits.max_urls_per_batch,
            ));
        }
        let concurrency = self.effective_concurrency(concurrency)?;

        let (mut slots, jobs) = self.prepare(&requests).await;
        info!(
            total = requests.len(),
            queued = jobs.len(),
            concurrency,
            "starting download batch"
        );

        self.dispatch(jobs, concurrency, &mut slots).await;

        let outcomes: Vec<DownloadOutcome> = slots
            .into_iter()
            .zip(&requests)
            .map(|(slot, request)| {
                slot.unwrap_or_else(|| {
                    warn!(url = request.url(), "no outcome recorded for download");
                    DownloadOutcome::failure(
                        request.url(),
                        FailureKind::NetworkError,
                        "download task ended without reporting an outcome",
                    )
                })
                .with_url(request.url())
            })
            .collect();

        let summary = BatchSummary::from_outcomes(outcomes);
        info!(
            succeeded = summary.success_count(),
            failed = summary.failed_count(),
            "download batch complete"
        );
        Ok(summary)
    }

    /// Validation and naming phases. Runs on the calling task only.
    async fn prepare(
        &self,
        requests: &[DownloadRequest],
    ) -> (Vec<Option<DownloadOutcome>>, VecDeque<(usize, FetchJob)>) {
        let mut slots: Vec<Option<DownloadOutcome>> = requests.iter().map(|_| None).collect();
        let mut dir_status: HashMap<PathBuf, Result<(), String>> = HashMap::new();
        let mut reservations = NameReservations::new();
        let mut named = Vec::with_capacity(requests.len());

        for (index, request) in requests.iter().enumerate() {
            let url = match self.validator.validate(request.url()) {
                Ok(url) => url,
                Err(rejection) => {
                    debug!(index, url = request.url(), %rejection, "rejected URL");
                    slots[index] = Some(DownloadOutcome::failure(
                        request.url(),
                        FailureKind::ValidationError,
                        rejection.to_string(),
                    ));
                    continue;
                }
            };

            let dir = request.output_dir();
            if !dir_status.contains_key(dir) {
                let status = tokio::fs::create_dir_all(dir).await.map_err(|e| {
                    warn!(dir = %dir.display(), error = %e, "cannot create output directory");
                    redact_paths(&format!("cannot create output directory {}: {e}", dir.display()))
                });
                dir_status.insert(dir.to_path_buf(), status);
            }
            if let Some(Err(detail)) = dir_status.get(dir) {
                slots[index] = Some(DownloadOutcome::failure(
                    request.url(),
                    FailureKind::FilesystemError,
                    detail.clone(),
                ));
                continue;
            }

            let resolved = reservations.resolve(&url, request.filename(), dir);
            debug!(index, name = %resolved.name, "reserved filename");
            named.push((index, url, resolved));
        }

        let frozen = reservations.freeze();
        let jobs = named
            .into_iter()
            .map(|(index, url, resolved)| {
                let request = &requests[index];
                let mut job = FetchJob::new(url, request.output_dir(), resolved.name)
                    .with_timeout(request.timeout())
                    .with_max_size_bytes(request.max_size_bytes());
                if resolved.extension_inferable
                    && let Some(reserved) = frozen.get(request.output_dir())
                {
                    job = job.with_extension_inference(Arc::clone(reserved));
                }
                (index, job)
            })
            .collect();

        (slots, jobs)
    }

    /// Runs `min(concurrency, jobs.len())` workers until the queue is drained.
    async fn dispatch(
        &self,
        jobs: VecDeque<(usize, FetchJob)>,
        concurrency: usize,
        slots: &mut [Option<DownloadOutcome>],
    ) {
        let workers = concurrency.min(jobs.len());
        if workers == 0 {
            return;
        }

        let queue: WorkQueue = Arc::new(Mutex::new(jobs));
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, DownloadOutcome)>();
        let mut pool = JoinSet::new();

        for worker in 0..workers {
            let queue = Arc::clone(&queue);
            let fetcher = Arc::clone(&self.fetcher);
            let tx = tx.clone();
            pool.spawn(async move {
                while let Some((index, job)) = next_job(&queue) {
                    debug!(worker, index, url = %job.url, "worker picked up download");
                    let outcome = run_isolated(Arc::clone(&fetcher), job).await;
                    if tx.send((index, outcome)).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        while let Some((index, outcome)) = rx.recv().await {
            slots[index] = Some(outcome);
        }
        while let Some(joined) = pool.join_next().await {
            if let Err(error) = joined {
                warn!(error = %error, "download worker terminated abnormally");
            }
        }
    }
}

fn next_job(queue: &WorkQueue) -> Option<(usize, FetchJob)> {
    queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pop_front()
}

/// Runs one fetch on its own task so a panic costs one outcome, not the worker.
async fn run_isolated(fetcher: Arc<dyn Fetch>, job: FetchJob) -> DownloadOutcome {
    let url = job.url.to_string();
    let file_name = job.file_name.clone();
    match tokio::spawn(async move { fetcher.fetch(&job).await }).await {
        Ok(outcome) => outcome,
        Err(error) => {
            warn!(url = %url, error = %error, "download task failed");
            DownloadOutcome::failure(
                url,
                FailureKind::NetworkError,
                format!("download task aborted: {error}"),
            )
            .with_file_name(file_name)
        }
    }
}
