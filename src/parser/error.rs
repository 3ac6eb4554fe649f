//! Rejection reasons produced by URL validation.

use thiserror::Error;

/// Maximum URL length to accept when no configuration overrides it.
pub const DEFAULT_MAX_URL_LENGTH: usize = 2048;

/// Why a candidate URL was rejected.
///
/// Validation is purely syntactic; none of these reasons involve network access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlRejection {
    /// The URL uses a scheme other than `http` or `https`.
    #[error("Unsupported protocol '{scheme}': only http and https are allowed")]
    InvalidScheme {
        /// The scheme that was found.
        scheme: String,
    },

    /// The URL is longer than the configured maximum.
    #[error("URL too long ({length} chars, max {max})")]
    TooLong {
        /// Actual length in bytes.
        length: usize,
        /// Configured maximum.
        max: usize,
    },

    /// The string is not a well-formed absolute URL.
    #[error("Invalid URL format: {reason}")]
    MalformedUrl {
        /// Why parsing failed.
        reason: String,
    },

    /// The host is a loopback, private or link-local address and host blocking is enabled.
    #[error("Access to '{host}' is blocked: {reason}")]
    BlockedHost {
        /// The offending host as written in the URL.
        host: String,
        /// Which rule matched.
        reason: &'static str,
    },
}

impl UrlRejection {
    /// Creates an `InvalidScheme` rejection.
    #[must_use]
    pub fn invalid_scheme(scheme: &str) -> Self {
        Self::InvalidScheme {
            scheme: scheme.to_string(),
        }
    }

    /// Creates a `TooLong` rejection.
    #[must_use]
    pub fn too_long(length: usize, max: usize) -> Self {
        Self::TooLong { length, max }
    }

    /// Creates a `MalformedUrl` rejection.
    #[must_use]
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedUrl {
            reason: reason.into(),
        }
    }

    /// Creates a `BlockedHost` rejection.
    #[must_use]
    pub fn blocked_host(host: impl Into<String>, reason: &'static str) -> Self {
        Self::BlockedHost {
            host: host.into(),
            reason,
        }
    }
}
