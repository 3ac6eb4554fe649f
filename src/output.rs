//! Human-readable and JSON rendering of batch results.

use std::fmt::Write as _;

use url_downloader::{BatchSummary, DownloadOutcome};

/// Renders one line per outcome followed by a totals line.
pub fn render_human(summary: &BatchSummary) -> String {
    let mut out = String::new();
    for outcome in summary.outcomes() {
        match outcome {
            DownloadOutcome::Success {
                url, path, bytes, ..
            } => {
                let _ = writeln!(out, "ok      {url} -> {} ({bytes} bytes)", path.display());
            }
            DownloadOutcome::Failure {
                url, kind, detail, ..
            } => {
                let _ = writeln!(out, "FAILED  {url}: {kind}: {detail}");
            }
        }
    }
    let _ = write!(
        out,
        "{} of {} downloaded, {} failed",
        summary.success_count(),
        summary.len(),
        summary.failed_count()
    );
    out
}

/// Renders the summary as pretty-printed JSON.
pub fn render_json(summary: &BatchSummary) -> serde_json::Result<String> {
    serde_json::to_string_pretty(summary)
}
