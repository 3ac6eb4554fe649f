//! Error types for the download module.
//!
//! [`DownloadError`] covers everything that can go wrong inside one fetch and
//! maps onto a [`FailureKind`] for the outcome.

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

use super::outcome::FailureKind;

/// Errors that can occur while fetching a single URL.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// The deadline elapsed before headers and body completed.
    #[error("timed out after {}s downloading {url}", .after.as_secs_f64())]
    Timeout {
        /// The URL that timed out.
        url: String,
        /// The deadline that was exceeded.
        after: Duration,
    },

    /// Non-2xx HTTP response.
    #[error("HTTP error {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The server declared a body larger than the cap.
    #[error("file size ({declared} bytes) exceeds maximum allowed size ({limit} bytes) for {url}")]
    DeclaredTooLarge {
        /// The URL being downloaded.
        url: String,
        /// Declared `Content-Length`.
        declared: u64,
        /// The configured cap in bytes.
        limit: u64,
    },

    /// The streamed body grew past the cap.
    #[error("download exceeds maximum allowed size ({limit} bytes) for {url}: received at least {received} bytes")]
    StreamTooLarge {
        /// The URL being downloaded.
        url: String,
        /// Bytes received when the cap was crossed.
        received: u64,
        /// The configured cap in bytes.
        limit: u64,
    },

    /// File system error during download (create, write, rename).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    ///
    /// Timeouts surfaced by reqwest itself are reported as [`DownloadError::Timeout`].
    pub fn network(url: impl Into<String>, source: reqwest::Error, deadline: Duration) -> Self {
        if source.is_timeout() {
            return Self::timeout(url, deadline);
        }
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            url: url.into(),
            after,
        }
    }

    /// Creates a size error for an oversized `Content-Length`.
    pub fn declared_too_large(url: impl Into<String>, declared: u64, limit: u64) -> Self {
        Self::DeclaredTooLarge {
            url: url.into(),
            declared,
            limit,
        }
    }

    /// Creates a size error for a body that overflowed while streaming.
    pub fn stream_too_large(url: impl Into<String>, received: u64, limit: u64) -> Self {
        Self::StreamTooLarge {
            url: url.into(),
            received,
            limit,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// The outcome category this error is reported under.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Network { .. } | Self::HttpStatus { .. } => FailureKind::NetworkError,
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::DeclaredTooLarge { .. } | Self::StreamTooLarge { .. } => {
                FailureKind::SizeExceeded
            }
            Self::Io { .. } => FailureKind::FilesystemError,
        }
    }

    /// Message plus the chain of underlying causes, with local paths redacted.
    #[must_use]
    pub fn detail(&self) -> String {
        let mut detail = self.to_string();
        let mut cause = std::error::Error::source(self).and_then(|err| err.source());
        while let Some(err) = cause {
            let text = err.to_string();
            if !detail.contains(&text) {
                detail.push_str(": ");
                detail.push_str(&text);
            }
            cause = err.source();
        }
        redact_paths(&detail)
    }
}

// An absolute path starts after the beginning of the text, whitespace, a quote,
// an opening paren or '='. URLs never match because their '/' follows ':' or a host.
#[allow(clippy::expect_used)]
static UNIX_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(^|[\s'"(=])/[^\s'"():]+"#).expect("unix path regex is valid")
});

#[allow(clippy::expect_used)]
static WINDOWS_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b[A-Za-z]:\\[^\s'"()]*"#).expect("windows path regex is valid")
});

/// Replaces absolute filesystem paths in `text` with `[PATH]`.
#[must_use]
pub fn redact_paths(text: &str) -> String {
    let text = UNIX_PATH.replace_all(text, "${1}[PATH]");
    WINDOWS_PATH.replace_all(&text, "[PATH]").into_owned()
}
