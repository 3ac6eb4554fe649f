//! Per-URL outcomes and batch summaries.
//!
//! These are the values handed back to the request layer. A failure is data,
//! not an `Err`: one bad URL never aborts its siblings.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Serialize, Serializer};

/// Why a single download did not produce a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    /// The URL was rejected before any network access.
    ValidationError,
    /// The per-download deadline elapsed before the body completed.
    Timeout,
    /// The declared or observed size exceeded the cap.
    SizeExceeded,
    /// Connection, DNS, TLS or HTTP status failure.
    NetworkError,
    /// Directory creation, write or final rename failed.
    FilesystemError,
}

impl FailureKind {
    /// Returns the stable label used in logs and rendered output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidationError => "ValidationError",
            Self::Timeout => "Timeout",
            Self::SizeExceeded => "SizeExceeded",
            Self::NetworkError => "NetworkError",
            Self::FilesystemError => "FilesystemError",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal result of one download request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DownloadOutcome {
    /// The file was fully written under the cap and renamed into place.
    Success {
        /// The URL as requested.
        url: String,
        /// Final location of the file.
        path: PathBuf,
        /// Number of body bytes written.
        bytes: u64,
        /// Wall time from request start to completed rename.
        #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
        elapsed: Duration,
    },
    /// Nothing was left at the target path.
    Failure {
        /// The URL as requested.
        url: String,
        /// The filename reserved for this request, when resolution ran.
        #[serde(skip_serializing_if = "Option::is_none")]
        file_name: Option<String>,
        /// Failure category.
        kind: FailureKind,
        /// Human-readable detail with local paths redacted.
        detail: String,
    },
}

impl DownloadOutcome {
    /// Creates a success outcome.
    #[must_use]
    pub fn success(url: impl Into<String>, path: PathBuf, bytes: u64, elapsed: Duration) -> Self {
        Self::Success {
            url: url.into(),
            path,
            bytes,
            elapsed,
        }
    }

    /// Creates a failure outcome without an assigned filename.
    #[must_use]
    pub fn failure(url: impl Into<String>, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self::Failure {
            url: url.into(),
            file_name: None,
            kind,
            detail: detail.into(),
        }
    }

    /// Attaches the reserved filename to a failure. No-op on success.
    #[must_use]
    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        if let Self::Failure { file_name, .. } = &mut self {
            *file_name = Some(name.into());
        }
        self
    }

    /// Replaces the recorded URL, keeping everything else.
    #[must_use]
    pub(crate) fn with_url(mut self, requested: &str) -> Self {
        match &mut self {
            Self::Success { url, .. } | Self::Failure { url, .. } => {
                requested.clone_into(url);
            }
        }
        self
    }

    /// Returns true for [`DownloadOutcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// The URL this outcome belongs to.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Success { url, .. } | Self::Failure { url, .. } => url,
        }
    }

    /// Final file path, for successes.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Success { path, .. } => Some(path),
            Self::Failure { .. } => None,
        }
    }

    /// Failure category, for failures.
    #[must_use]
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }

    /// Failure detail, for failures.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { detail, .. } => Some(detail),
        }
    }

    /// The filename this outcome was written to or reserved under.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        match self {
            Self::Success { path, .. } => path.file_name().and_then(|name| name.to_str()),
            Self::Failure { file_name, .. } => file_name.as_deref(),
        }
    }
}

/// Ordered outcomes of one batch with aggregate counts.
///
/// `outcomes[i]` always corresponds to the i-th request of the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    outcomes: Vec<DownloadOutcome>,
    success_count: usize,
    failed_count: usize,
}

impl BatchSummary {
    /// Builds a summary from outcomes already in input order.
    #[must_use]
    pub fn from_outcomes(outcomes: Vec<DownloadOutcome>) -> Self {
        let success_count = outcomes.iter().filter(|o| o.is_success()).count();
        let failed_count = outcomes.len() - success_count;
        Self {
            outcomes,
            success_count,
            failed_count,
        }
    }

    /// Outcomes in input order.
    #[must_use]
    pub fn outcomes(&self) -> &[DownloadOutcome] {
        &self.outcomes
    }

    /// Consumes the summary, returning the ordered outcomes.
    #[must_use]
    pub fn into_outcomes(self) -> Vec<DownloadOutcome> {
        self.outcomes
    }

    /// Number of successful downloads.
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.success_count
    }

    /// Number of failed downloads.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.failed_count
    }

    /// Total number of outcomes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns true when the batch contained no requests.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

fn serialize_millis<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}
