//! CLI entry point for the URL downloader.

use std::io::{self, IsTerminal, Read};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{debug, info};
use url_downloader::{
    BatchDownload, BatchSummary, DownloadService, DownloaderConfig, SingleDownload,
    load_config_file, load_default_config,
};

mod cli;
mod output;

use cli::Args;

/// Exit status when at least one download failed.
const EXIT_PARTIAL_FAILURE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    debug!(?args, "CLI arguments parsed");

    match run(args).await {
        Ok(Some(summary)) if summary.failed_count() > 0 => ExitCode::from(EXIT_PARTIAL_FAILURE),
        Ok(_) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<Option<BatchSummary>> {
    let config = load_config(&args)?;

    let urls = read_urls(&args)?;
    if urls.is_empty() {
        info!("No input provided. Pass URLs as arguments or pipe them via stdin.");
        info!("Example: echo 'https://example.com/file.pdf' | url-downloader");
        return Ok(None);
    }
    if args.filename.is_some() && urls.len() > 1 {
        bail!("--filename can only be used with a single URL ({} given)", urls.len());
    }

    let service = DownloadService::new(config).context("Failed to initialize downloader")?;

    let summary = if let [url] = urls.as_slice() {
        let request = SingleDownload {
            url: url.clone(),
            output_dir: args.output_dir.clone(),
            filename: args.filename.clone(),
            timeout_secs: args.timeout,
            max_size_mb: args.max_size_mb,
        };
        let outcome = service.download_single(request).await?;
        BatchSummary::from_outcomes(vec![outcome])
    } else {
        let request = BatchDownload {
            urls,
            output_dir: args.output_dir.clone(),
            timeout_secs: args.timeout,
            max_size_mb: args.max_size_mb,
            concurrency: args.concurrency,
        };
        service.download_files(request).await?
    };

    if args.json {
        println!(
            "{}",
            output::render_json(&summary).context("Failed to serialize results")?
        );
    } else {
        println!("{}", output::render_human(&summary));
    }

    Ok(Some(summary))
}

fn load_config(args: &Args) -> Result<DownloaderConfig> {
    if let Some(path) = &args.config {
        let config = load_config_file(path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?;
        debug!(path = %path.display(), "loaded config file");
        return Ok(config);
    }

    let loaded = load_default_config().context("Failed to load default config")?;
    if loaded.loaded_from_file
        && let Some(path) = &loaded.path
    {
        debug!(path = %path.display(), "loaded config file");
    }
    Ok(loaded.config)
}

/// URLs from the arguments, else one per line from piped stdin.
///
/// Blank lines and lines starting with `#` are skipped.
fn read_urls(args: &Args) -> Result<Vec<String>> {
    if !args.urls.is_empty() {
        return Ok(args.urls.clone());
    }
    if io::stdin().is_terminal() {
        return Ok(Vec::new());
    }

    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read URLs from stdin")?;
    Ok(buffer
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_owned)
        .collect())
}
