//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use url_downloader::download::{MAX_MAX_SIZE_MB, MAX_TIMEOUT_SECS, MIN_MAX_SIZE_MB, MIN_TIMEOUT_SECS};

/// Download files over HTTP/HTTPS with size, time and naming safeguards.
///
/// URLs are taken from the arguments, or one per line from stdin when none
/// are given. Exit status is 0 when every download succeeded, 2 when some
/// failed, and 1 when the request itself was rejected.
#[derive(Parser, Debug)]
#[command(name = "url-downloader")]
#[command(author, version, about)]
pub struct Args {
    /// URLs to download
    pub urls: Vec<String>,

    /// Directory to save files into (default: configured output directory)
    #[arg(short = 'o', long)]
    pub output_dir: Option<PathBuf>,

    /// Filename to save as (single URL only)
    #[arg(short = 'f', long)]
    pub filename: Option<String>,

    /// Per-download timeout in seconds (1-300)
    #[arg(short = 't', long, value_parser = clap::value_parser!(u64).range(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS))]
    pub timeout: Option<u64>,

    /// Maximum size per file in MB (1-5000)
    #[arg(short = 'm', long, value_parser = clap::value_parser!(u64).range(MIN_MAX_SIZE_MB..=MAX_MAX_SIZE_MB))]
    pub max_size_mb: Option<u64>,

    /// Maximum concurrent downloads (default: configured max_concurrency)
    #[arg(short = 'c', long)]
    pub concurrency: Option<usize>,

    /// Config file to use instead of the default location
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Print results as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}
