//! URL validation for download requests.

use std::net::{Ipv4Addr, Ipv6Addr};

use tracing::{debug, trace};
use url::{Host, Url};

use super::error::{DEFAULT_MAX_URL_LENGTH, UrlRejection};

/// Result of validating a candidate URL: the normalized URL or the reason it was rejected.
pub type ValidationOutcome = Result<Url, UrlRejection>;

/// Syntactic URL validator.
///
/// Never touches the network. Host blocking only inspects `localhost` names and
/// literal IP addresses; hostnames are not resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlValidator {
    max_url_length: usize,
    block_private_hosts: bool,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_URL_LENGTH)
    }
}

impl UrlValidator {
    /// Creates a validator with the given maximum URL length and host blocking disabled.
    #[must_use]
    pub fn new(max_url_length: usize) -> Self {
        Self {
            max_url_length,
            block_private_hosts: false,
        }
    }

    /// Enables or disables rejection of loopback, private and link-local hosts.
    #[must_use]
    pub fn with_private_host_blocking(mut self, enabled: bool) -> Self {
        self.block_private_hosts = enabled;
        self
    }

    /// Returns the configured maximum URL length.
    #[must_use]
    pub fn max_url_length(&self) -> usize {
        self.max_url_length
    }

    /// Validates a raw URL string and returns its normalized form.
    ///
    /// # Validation rules
    /// - Must not exceed the configured maximum length
    /// - Must be parseable as an absolute URL
    /// - Must use the `http` or `https` scheme
    /// - Must have a non-empty host
    /// - When host blocking is enabled, must not target a local or private address
    ///
    /// # Errors
    ///
    /// Returns the [`UrlRejection`] describing the first rule that failed.
    pub fn validate(&self, raw: &str) -> ValidationOutcome {
        let candidate = raw.trim();
        trace!(url = %candidate, "validating URL");

        // Length first so oversized input is never handed to the parser
        if candidate.len() > self.max_url_length {
            return Err(UrlRejection::too_long(candidate.len(), self.max_url_length));
        }

        if candidate.is_empty() {
            return Err(UrlRejection::malformed("URL is empty"));
        }

        let parsed = Url::parse(candidate).map_err(|e| UrlRejection::malformed(e.to_string()))?;

        match parsed.scheme() {
            "http" | "https" => {}
            scheme => return Err(UrlRejection::invalid_scheme(scheme)),
        }

        let Some(host) = parsed.host() else {
            return Err(UrlRejection::malformed("URL has no host"));
        };

        if self.block_private_hosts
            && let Some(reason) = blocked_host_reason(&host)
        {
            debug!(url = %candidate, reason, "URL rejected by host policy");
            return Err(UrlRejection::blocked_host(host.to_string(), reason));
        }

        Ok(parsed)
    }
}

/// Validates a URL with default settings (2048 chars, no host blocking).
///
/// # Errors
///
/// See [`UrlValidator::validate`].
pub fn validate_url(raw: &str) -> ValidationOutcome {
    UrlValidator::default().validate(raw)
}

fn blocked_host_reason(host: &Host<&str>) -> Option<&'static str> {
    match host {
        Host::Domain(domain) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            (domain == "localhost" || domain.ends_with(".localhost"))
                .then_some("localhost is not allowed")
        }
        Host::Ipv4(ip) => ipv4_block_reason(*ip),
        Host::Ipv6(ip) => ipv6_block_reason(*ip),
    }
}

fn ipv4_block_reason(ip: Ipv4Addr) -> Option<&'static str> {
    if ip.is_loopback() {
        Some("loopback address not allowed")
    } else if ip.is_private() {
        Some("private address")
    } else if ip.is_link_local() {
        Some("link-local address")
    } else if ip.is_unspecified() || ip.is_broadcast() {
        Some("unroutable address")
    } else {
        None
    }
}

fn ipv6_block_reason(ip: Ipv6Addr) -> Option<&'static str> {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return ipv4_block_reason(mapped);
    }
    let first = ip.segments()[0];
    if ip.is_loopback() {
        Some("loopback address not allowed")
    } else if ip.is_unspecified() {
        Some("unroutable address")
    } else if first & 0xffc0 == 0xfe80 {
        Some("link-local address")
    } else if first & 0xfe00 == 0xfc00 {
        Some("private address")
    } else {
        None
    }
}
