//! Downloader configuration: defaults, TOML file loading and validation.
//!
//! The file lives at `$XDG_CONFIG_HOME/url-downloader/config.toml` or
//! `$HOME/.config/url-downloader/config.toml`. Every key is optional; a
//! missing file means built-in defaults.
//!
//! ```toml
//! default_output_dir = "/srv/downloads"
//! default_timeout_secs = 120
//! max_concurrency = 8
//! concurrency_policy = "clamp"
//! block_private_hosts = true
//! allowed_output_roots = ["/srv/downloads"]
//! ```

use std::env;
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::download::{
    CONCURRENCY_CEILING, CONNECT_TIMEOUT_SECS, ConcurrencyPolicy, DEFAULT_CONCURRENCY,
    DEFAULT_MAX_SIZE_MB, DEFAULT_MAX_URLS_PER_BATCH, DEFAULT_TIMEOUT_SECS, MAX_MAX_SIZE_MB,
    MAX_TIMEOUT_SECS, MIN_MAX_SIZE_MB, MIN_TIMEOUT_SECS,
};
use crate::parser::DEFAULT_MAX_URL_LENGTH;

/// Directory name under the XDG config root.
pub const CONFIG_DIR_NAME: &str = "url-downloader";

/// Config file name.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Upper bound accepted for `max_url_length`.
const MAX_URL_LENGTH_LIMIT: usize = 65_536;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config file '{path}': {source}")]
    Read {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML or has unknown keys.
    #[error("failed to parse config file '{path}': {source}")]
    Parse {
        /// Path of the config file.
        path: PathBuf,
        /// The underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// A value is outside its accepted range.
    #[error("invalid config value for `{field}`: {value}. Expected range: {expected}")]
    Invalid {
        /// Offending key.
        field: &'static str,
        /// Rendered value.
        value: String,
        /// Rendered accepted range.
        expected: String,
    },
}

impl ConfigError {
    fn out_of_range<T: std::fmt::Display>(
        field: &'static str,
        value: T,
        range: &RangeInclusive<T>,
    ) -> Self {
        Self::Invalid {
            field,
            value: value.to_string(),
            expected: format!("{}..={}", range.start(), range.end()),
        }
    }
}

/// Tunable limits and defaults for the downloader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DownloaderConfig {
    /// Longest accepted URL in characters.
    pub max_url_length: usize,
    /// Per-download deadline when the request gives none.
    pub default_timeout_secs: u64,
    /// Size cap in MB when the request gives none.
    pub default_max_size_mb: u64,
    /// Largest accepted batch concurrency.
    pub max_concurrency: usize,
    /// Largest accepted batch.
    pub max_urls_per_batch: usize,
    /// Target directory when the request gives none.
    pub default_output_dir: PathBuf,
    /// Handling of out-of-range concurrency.
    pub concurrency_policy: ConcurrencyPolicy,
    /// Reject loopback, private and link-local hosts.
    pub block_private_hosts: bool,
    /// When non-empty, output directories must live under one of these.
    pub allowed_output_roots: Vec<PathBuf>,
    /// TCP connect timeout for the shared client.
    pub connect_timeout_secs: u64,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            max_url_length: DEFAULT_MAX_URL_LENGTH,
            default_timeout_secs: DEFAULT_TIMEOUT_SECS,
            default_max_size_mb: DEFAULT_MAX_SIZE_MB,
            max_concurrency: DEFAULT_CONCURRENCY,
            max_urls_per_batch: DEFAULT_MAX_URLS_PER_BATCH,
            default_output_dir: default_output_dir(),
            concurrency_policy: ConcurrencyPolicy::default(),
            block_private_hosts: false,
            allowed_output_roots: Vec::new(),
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
        }
    }
}

impl DownloaderConfig {
    /// Parses a TOML document on top of the defaults and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(raw: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validates config values against runtime constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range("max_url_length", self.max_url_length, 1..=MAX_URL_LENGTH_LIMIT)?;
        check_range(
            "default_timeout_secs",
            self.default_timeout_secs,
            MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS,
        )?;
        check_range(
            "default_max_size_mb",
            self.default_max_size_mb,
            MIN_MAX_SIZE_MB..=MAX_MAX_SIZE_MB,
        )?;
        check_range("max_concurrency", self.max_concurrency, 1..=CONCURRENCY_CEILING)?;
        check_range("max_urls_per_batch", self.max_urls_per_batch, 1..=usize::MAX)?;
        check_range(
            "connect_timeout_secs",
            self.connect_timeout_secs,
            MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS,
        )?;
        Ok(())
    }
}

fn check_range<T>(field: &'static str, value: T, range: RangeInclusive<T>) -> Result<(), ConfigError>
where
    T: PartialOrd + std::fmt::Display,
{
    if range.contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::out_of_range(field, value, &range))
    }
}

/// Configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Path that was consulted, if one could be determined.
    pub path: Option<PathBuf>,
    /// Effective configuration.
    pub config: DownloaderConfig,
    /// Indicates whether configuration was loaded from disk.
    pub loaded_from_file: bool,
}

/// Resolves the default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/url-downloader/config.toml`
/// 2. `$HOME/.config/url-downloader/config.toml`
#[must_use]
pub fn resolve_default_config_path() -> Option<PathBuf> {
    if let Some(xdg_config_home) = env_var_non_empty_os("XDG_CONFIG_HOME") {
        return Some(
            PathBuf::from(xdg_config_home)
                .join(CONFIG_DIR_NAME)
                .join(CONFIG_FILE_NAME),
        );
    }

    let home = env_var_non_empty_os("HOME")?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME),
    )
}

/// Default download directory: `$HOME/Downloads`, else `./downloads`.
#[must_use]
pub fn default_output_dir() -> PathBuf {
    env_var_non_empty_os("HOME").map_or_else(
        || PathBuf::from("downloads"),
        |home| PathBuf::from(home).join("Downloads"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

/// Loads config from the default path if present, else defaults.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file exists but cannot be read, parsed or
/// validated.
pub fn load_default_config() -> Result<LoadedConfig, ConfigError> {
    let path = resolve_default_config_path();
    match path.as_deref() {
        Some(path_ref) if path_ref.exists() => {
            let config = load_config_file(path_ref)?;
            Ok(LoadedConfig {
                path,
                config,
                loaded_from_file: true,
            })
        }
        _ => Ok(LoadedConfig {
            path,
            config: DownloaderConfig::default(),
            loaded_from_file: false,
        }),
    }
}

/// Loads and validates the config file at `path`.
///
/// # Errors
///
/// Returns [`ConfigError`] when the file cannot be read, parsed or validated.
pub fn load_config_file(path: &Path) -> Result<DownloaderConfig, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    DownloaderConfig::from_toml_str(&raw, path)
}
