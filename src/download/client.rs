//! Bounded HTTP fetcher.
//!
//! [`HttpClient`] performs one GET per [`FetchJob`] under a deadline and a byte
//! cap, streaming into a hidden temporary file next to the destination. The
//! temporary file is renamed into place only after the body completes; on
//! every other exit path it is deleted.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::redirect::Policy;
use tempfile::TempPath;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::constants::{
    BYTES_PER_MB, CONNECT_TIMEOUT_SECS, DEFAULT_MAX_SIZE_MB, DEFAULT_TIMEOUT_SECS, MAX_REDIRECTS,
};
use super::error::DownloadError;
use super::filename::{extension_from_content_type, with_extension};
use super::outcome::DownloadOutcome;
use crate::user_agent;

/// Suffix of in-progress temporary files.
pub const TEMP_SUFFIX: &str = ".part";

/// Temporary file names embed at most this many characters of the final name.
const TEMP_PREFIX_MAX_CHARS: usize = 64;

/// Whether the fetcher may append an extension guessed from `Content-Type`.
#[derive(Debug, Clone, Default)]
pub enum ExtensionInference {
    /// Always use the reserved name.
    #[default]
    Disabled,
    /// Try `{name}.{ext}` unless another request in the batch reserved it.
    Enabled {
        /// Names reserved in the target directory for the whole batch.
        reserved: Arc<HashSet<String>>,
    },
}

/// A validated, named unit of work for the fetcher.
#[derive(Debug, Clone)]
pub struct FetchJob {
    /// Normalized URL to GET.
    pub url: Url,
    /// Directory the file lands in; temp files are created here too.
    pub target_dir: PathBuf,
    /// Reserved final filename.
    pub file_name: String,
    /// Deadline covering headers and body.
    pub timeout: Duration,
    /// Size cap in bytes.
    pub max_size_bytes: u64,
    /// Content-type extension inference policy.
    pub extension_inference: ExtensionInference,
}

impl FetchJob {
    /// Creates a job with default limits and no extension inference.
    #[must_use]
    pub fn new(url: Url, target_dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            url,
            target_dir: target_dir.into(),
            file_name: file_name.into(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_size_bytes: DEFAULT_MAX_SIZE_MB * BYTES_PER_MB,
            extension_inference: ExtensionInference::Disabled,
        }
    }

    /// Sets the deadline.
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

    /// Enables extension inference against the batch's reserved names.
    #[must_use]
    pub fn with_extension_inference(mut self, reserved: Arc<HashSet<String>>) -> Self {
        self.extension_inference = ExtensionInference::Enabled { reserved };
        self
    }

    /// Final path for the reserved name.
    #[must_use]
    pub fn target_path(&self) -> PathBuf {
        self.target_dir.join(&self.file_name)
    }
}

/// Performs a single bounded download.
///
/// Implementations never return an error: every failure is folded into a
/// [`DownloadOutcome::Failure`].
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Downloads `job.url` into `job.target_dir`.
    async fn fetch(&self, job: &FetchJob) -> DownloadOutcome;
}

/// HTTP client for bounded streaming downloads.
///
/// Create once and share; the inner connection pool is reused across jobs.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with the default 30 second connect timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .expect("failed to build HTTP client with static configuration")
    }

    /// Creates a client with an explicit connect timeout.
    ///
    /// # Errors
    ///
    /// Returns the reqwest builder error (for example when no TLS backend can
    /// be initialized).
    pub fn with_connect_timeout(connect_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .user_agent(user_agent::default_download_user_agent())
            .build()?;
        Ok(Self { client })
    }

    /// Returns the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Sends the request and streams the body into a temp file.
    ///
    /// On any error the returned temp path has already been dropped, which
    /// deletes the file.
    async fn transfer(&self, job: &FetchJob) -> Result<Transfer, DownloadError> {
        let url = job.url.as_str();
        let response = self
            .client
            .get(job.url.clone())
            .send()
            .await
            .map_err(|e| DownloadError::network(url, e, job.timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        if let Some(declared) = response.content_length()
            && declared > job.max_size_bytes
        {
            return Err(DownloadError::declared_too_large(
                url,
                declared,
                job.max_size_bytes,
            ));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let temp = tempfile::Builder::new()
            .prefix(&temp_prefix(&job.file_name))
            .suffix(TEMP_SUFFIX)
            .tempfile_in(&job.target_dir)
            .map_err(|e| DownloadError::io(&job.target_dir, e))?;
        let (file, temp_path) = temp.into_parts();
        debug!(temp = %temp_path.display(), "streaming to temp file");

        let mut writer = BufWriter::new(tokio::fs::File::from_std(file));
        let body = std::pin::pin!(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(|e| DownloadError::network(url, e, job.timeout)))
        );
        let bytes = write_capped(body, &mut writer, url, &temp_path, job.max_size_bytes).await?;
        drop(writer);

        Ok(Transfer {
            temp_path,
            bytes,
            content_type,
        })
    }
}

#[async_trait]
impl Fetch for HttpClient {
    #[instrument(skip(self, job), fields(url = %job.url, file = %job.file_name))]
    async fn fetch(&self, job: &FetchJob) -> DownloadOutcome {
        let started = Instant::now();

        let transferred = match tokio::time::timeout(job.timeout, self.transfer(job)).await {
            Ok(result) => result,
            Err(_) => Err(DownloadError::timeout(job.url.as_str(), job.timeout)),
        };

        let result = transferred.and_then(|transfer| {
            let path = publish(transfer.temp_path, job, transfer.content_type.as_deref())?;
            Ok((path, transfer.bytes))
        });

        match result {
            Ok((path, bytes)) => {
                let elapsed = started.elapsed();
                info!(
                    bytes,
                    elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                    path = %path.display(),
                    "download complete"
                );
                DownloadOutcome::success(job.url.as_str(), path, bytes, elapsed)
            }
            Err(error) => {
                warn!(kind = %error.kind(), error = %error, "download failed");
                DownloadOutcome::failure(job.url.as_str(), error.kind(), error.detail())
                    .with_file_name(job.file_name.clone())
            }
        }
    }
}

/// A completed body sitting in its temp file.
struct Transfer {
    temp_path: TempPath,
    bytes: u64,
    content_type: Option<String>,
}

/// Writes `body` through `writer`, failing as soon as the total exceeds `max_bytes`.
///
/// The oversized chunk is never written.
async fn write_capped<S, B, W>(
    mut body: S,
    writer: &mut W,
    url: &str,
    file_path: &Path,
    max_bytes: u64,
) -> Result<u64, DownloadError>
where
    S: Stream<Item = Result<B, DownloadError>> + Unpin,
    B: AsRef<[u8]>,
    W: AsyncWrite + Unpin,
{
    let mut bytes_written: u64 = 0;

    while let Some(chunk) = body.next().await {
        let chunk = chunk?;
        let chunk = chunk.as_ref();
        let total = bytes_written + chunk.len() as u64;
        if total > max_bytes {
            return Err(DownloadError::stream_too_large(url, total, max_bytes));
        }

        writer
            .write_all(chunk)
            .await
            .map_err(|e| DownloadError::io(file_path, e))?;
        bytes_written = total;
    }

    writer
        .flush()
        .await
        .map_err(|e| DownloadError::io(file_path, e))?;

    Ok(bytes_written)
}

/// Renames the temp file into place without overwriting anything.
///
/// An inferred `{name}.{ext}` is tried first when allowed; if it is taken the
/// reserved name is used instead.
fn publish(
    mut temp_path: TempPath,
    job: &FetchJob,
    content_type: Option<&str>,
) -> Result<PathBuf, DownloadError> {
    if let Some(name) = inferred_name(job, content_type) {
        let path = job.target_dir.join(&name);
        match temp_path.persist_noclobber(&path) {
            Ok(()) => return Ok(path),
            Err(err) => {
                debug!(name = %name, error = %err.error, "inferred name unavailable, using reserved name");
                temp_path = err.path;
            }
        }
    }

    let path = job.target_path();
    temp_path
        .persist_noclobber(&path)
        .map_err(|err| DownloadError::io(&path, err.error))?;
    Ok(path)
}

fn inferred_name(job: &FetchJob, content_type: Option<&str>) -> Option<String> {
    let ExtensionInference::Enabled { reserved } = &job.extension_inference else {
        return None;
    };
    let ext = extension_from_content_type(content_type?)?;
    let name = with_extension(&job.file_name, ext);
    (!reserved.contains(&name)).then_some(name)
}

fn temp_prefix(file_name: &str) -> String {
    let head: String = file_name.chars().take(TEMP_PREFIX_MAX_CHARS).collect();
    format!(".{head}.")
}
