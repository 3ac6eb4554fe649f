//! Filename derivation, sanitization, and collision-free reservation.
//!
//! Names come from a caller hint or the URL's last path segment, are reduced
//! to a single safe path component, and are made unique against both the
//! target directory and every name already handed out in the same batch.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use url::Url;

/// Longest filename, in bytes, the resolver will produce.
pub const MAX_FILENAME_BYTES: usize = 255;

/// Name used when neither the hint nor the URL yields anything usable.
pub const FALLBACK_FILENAME: &str = "download";

/// Longest extension (without the dot) treated as an extension.
const MAX_EXTENSION_CHARS: usize = 12;

/// Query parameters consulted, in order, when the URL path has no usable segment.
const NAME_QUERY_PARAMS: [&str; 3] = ["filename", "file", "name"];

/// Result of resolving a filename for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedFilename {
    /// Final filename, reserved for this request.
    pub name: String,
    /// True when the name was derived from the URL and carries no extension,
    /// so the fetcher may append one from the response `Content-Type`.
    pub extension_inferable: bool,
}

/// Resolves a safe, unique filename and records it in `reserved`.
///
/// The hint wins when it survives sanitization; otherwise the name is derived
/// from the URL. On collision with `reserved` or an existing entry in
/// `target_dir`, ` (1)`, ` (2)`, ... is inserted before the extension.
pub fn resolve_filename(
    url: &Url,
    hint: Option<&str>,
    target_dir: &Path,
    reserved: &mut HashSet<String>,
) -> ResolvedFilename {
    let from_hint = hint.and_then(sanitize_filename);
    let hinted = from_hint.is_some();
    let candidate = from_hint.unwrap_or_else(|| filename_from_url(url));

    let name = unique_name(&candidate, target_dir, reserved);
    reserved.insert(name.clone());

    ResolvedFilename {
        extension_inferable: !hinted && split_extension(&candidate).1.is_none(),
        name,
    }
}

/// Per-directory reservation sets for one batch.
///
/// Resolution happens on a single task in input order; once dispatch begins
/// the sets are frozen into shared read-only snapshots.
#[derive(Debug, Default)]
pub struct NameReservations {
    by_dir: HashMap<PathBuf, HashSet<String>>,
}

impl NameReservations {
    /// Creates an empty reservation table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves and reserves a filename in `target_dir`.
    pub fn resolve(&mut self, url: &Url, hint: Option<&str>, target_dir: &Path) -> ResolvedFilename {
        let reserved = self.by_dir.entry(target_dir.to_path_buf()).or_default();
        resolve_filename(url, hint, target_dir, reserved)
    }

    /// Returns true if `name` is already reserved in `target_dir`.
    #[must_use]
    pub fn is_reserved(&self, target_dir: &Path, name: &str) -> bool {
        self.by_dir
            .get(target_dir)
            .is_some_and(|names| names.contains(name))
    }

    /// Freezes the table into shared per-directory snapshots.
    #[must_use]
    pub fn freeze(self) -> HashMap<PathBuf, Arc<HashSet<String>>> {
        self.by_dir
            .into_iter()
            .map(|(dir, names)| (dir, Arc::new(names)))
            .collect()
    }
}

/// Derives a sanitized filename from the URL.
///
/// Uses the percent-decoded last path segment, then a `filename`, `file` or
/// `name` query parameter, then [`FALLBACK_FILENAME`].
#[must_use]
pub fn filename_from_url(url: &Url) -> String {
    if let Some(mut segments) = url.path_segments()
        && let Some(last) = segments.next_back()
        && !last.is_empty()
    {
        let decoded = urlencoding::decode_binary(last.as_bytes());
        if let Some(name) = sanitize_filename(&String::from_utf8_lossy(&decoded)) {
            return name;
        }
    }

    for key in NAME_QUERY_PARAMS {
        if let Some((_, value)) = url.query_pairs().find(|(k, _)| k == key)
            && let Some(name) = sanitize_filename(&value)
        {
            return name;
        }
    }

    FALLBACK_FILENAME.to_string()
}

/// Reduces `name` to a single safe path component.
///
/// Path separators and `<>:"|?*` become `_`, control characters are dropped,
/// leading dots and surrounding whitespace are trimmed, and the result is cut
/// to [`MAX_FILENAME_BYTES`] keeping the extension. Returns `None` when nothing
/// is left.
#[must_use]
pub fn sanitize_filename(name: &str) -> Option<String> {
    let replaced: String = name
        .chars()
        .filter(|c| !c.is_control())
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim().trim_start_matches('.').trim();
    if trimmed.is_empty() {
        return None;
    }

    let (stem, ext) = split_extension(trimmed);
    Some(fit_name(stem, "", ext))
}

/// Splits `name` into stem and extension (without the dot).
///
/// An extension is 1 to 12 ASCII alphanumeric characters after the last dot,
/// and the stem must be non-empty.
#[must_use]
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(pos) if pos > 0 => {
            let ext = &name[pos + 1..];
            if !ext.is_empty()
                && ext.len() <= MAX_EXTENSION_CHARS
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
            {
                (&name[..pos], Some(ext))
            } else {
                (name, None)
            }
        }
        _ => (name, None),
    }
}

/// Guesses a file extension (without the dot) from a `Content-Type` value.
///
/// Unknown or generic types yield `None`; the mapping is best effort.
#[must_use]
pub fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    let ext = match mime.as_str() {
        "text/html" => "html",
        "text/plain" => "txt",
        "text/csv" => "csv",
        "text/css" => "css",
        "text/markdown" => "md",
        "text/javascript" | "application/javascript" => "js",
        "application/json" => "json",
        "application/xml" | "text/xml" => "xml",
        "application/pdf" => "pdf",
        "application/zip" => "zip",
        "application/gzip" | "application/x-gzip" => "gz",
        "application/x-tar" => "tar",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "video/mp4" => "mp4",
        "audio/mpeg" => "mp3",
        _ => return None,
    };
    Some(ext)
}

/// Appends an inferred extension to a reserved name, keeping the byte limit.
#[must_use]
pub fn with_extension(name: &str, ext: &str) -> String {
    fit_name(name, "", Some(ext))
}

fn unique_name(candidate: &str, target_dir: &Path, reserved: &HashSet<String>) -> String {
    if !is_taken(candidate, target_dir, reserved) {
        return candidate.to_string();
    }

    let (stem, ext) = split_extension(candidate);
    let mut counter: u64 = 1;
    loop {
        let name = fit_name(stem, &format!(" ({counter})"), ext);
        if !is_taken(&name, target_dir, reserved) {
            return name;
        }
        counter += 1;
    }
}

fn is_taken(name: &str, target_dir: &Path, reserved: &HashSet<String>) -> bool {
    reserved.contains(name) || std::fs::symlink_metadata(target_dir.join(name)).is_ok()
}

/// Builds `{stem}{suffix}.{ext}`, shortening the stem to fit the byte limit.
fn fit_name(stem: &str, suffix: &str, ext: Option<&str>) -> String {
    let ext_len = ext.map_or(0, |e| e.len() + 1);
    let budget = MAX_FILENAME_BYTES.saturating_sub(suffix.len() + ext_len);

    let mut cut = stem.len().min(budget);
    while !stem.is_char_boundary(cut) {
        cut -= 1;
    }
    let stem = stem[..cut].trim_end();

    match ext {
        Some(ext) => format!("{stem}{suffix}.{ext}"),
        None => format!("{stem}{suffix}"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn test_sanitize_filename_replaces_reserved_chars() {
        assert_eq!(
            sanitize_filename("file<>:\"|?*.txt").as_deref(),
            Some("file_______.txt")
        );
        assert_eq!(sanitize_filename("<<<>>>").as_deref(), Some("______"));
        assert_eq!(sanitize_filename("a\\b.txt").as_deref(), Some("a_b.txt"));
    }

    #[test]
    fn test_sanitize_filename_neutralizes_traversal() {
        assert_eq!(
            sanitize_filename("../../../etc/passwd").as_deref(),
            Some("_.._.._etc_passwd")
        );
        assert_eq!(sanitize_filename(".."), None);
        assert_eq!(sanitize_filename("."), None);
    }

    #[test]
    fn test_sanitize_filename_trims_dots_and_whitespace() {
        assert_eq!(sanitize_filename("...file.txt").as_deref(), Some("file.txt"));
        assert_eq!(sanitize_filename("  file.txt   ").as_deref(), Some("file.txt"));
        assert_eq!(sanitize_filename("   "), None);
        assert_eq!(sanitize_filename(""), None);
    }

    #[test]
    fn test_sanitize_filename_drops_control_chars() {
        assert_eq!(
            sanitize_filename("re\u{0}po\nrt.pdf").as_deref(),
            Some("report.pdf")
        );
    }

    #[test]
    fn test_sanitize_filename_keeps_unicode() {
        assert_eq!(sanitize_filename("日本語.pdf").as_deref(), Some("日本語.pdf"));
        assert_eq!(sanitize_filename("file (1).pdf").as_deref(), Some("file (1).pdf"));
    }

    #[test]
    fn test_sanitize_filename_truncates_preserving_extension() {
        let long = format!("{}.txt", "a".repeat(300));
        let name = sanitize_filename(&long).unwrap();
        assert!(name.len() <= MAX_FILENAME_BYTES, "too long: {}", name.len());
        assert!(name.ends_with(".txt"));

        let wide = format!("{}.pdf", "日".repeat(120));
        let name = sanitize_filename(&wide).unwrap();
        assert!(name.len() <= MAX_FILENAME_BYTES);
        assert!(name.ends_with(".pdf"));
    }

    #[test]
    fn test_split_extension() {
        assert_eq!(split_extension("report.pdf"), ("report", Some("pdf")));
        assert_eq!(split_extension("archive.tar.gz"), ("archive.tar", Some("gz")));
        assert_eq!(split_extension("README"), ("README", None));
        assert_eq!(split_extension("file."), ("file.", None));
        assert_eq!(split_extension("v1.2-final"), ("v1.2-final", None));
        assert_eq!(
            split_extension("file.toolongextension"),
            ("file.toolongextension", None)
        );
    }

    #[test]
    fn test_filename_from_url_decodes_last_segment() {
        assert_eq!(
            filename_from_url(&url("https://example.com/files/my%20document.pdf")),
            "my document.pdf"
        );
        assert_eq!(
            filename_from_url(&url("https://example.com/a/report.pdf?version=2#page=3")),
            "report.pdf"
        );
    }

    #[test]
    fn test_filename_from_url_encoded_separator_stays_in_component() {
        let name = filename_from_url(&url("https://example.com/..%2F..%2Fetc%2Fpasswd"));
        assert!(!name.contains('/'), "separator leaked: {name}");
        assert!(!name.starts_with('.'), "leading dot kept: {name}");
    }

    #[test]
    fn test_filename_from_url_query_fallback() {
        assert_eq!(
            filename_from_url(&url("https://example.com/?filename=report.pdf")),
            "report.pdf"
        );
        assert_eq!(
            filename_from_url(&url("https://example.com/download/?file=data.csv")),
            "data.csv"
        );
    }

    #[test]
    fn test_filename_from_url_generic_fallback() {
        assert_eq!(filename_from_url(&url("https://example.com/")), FALLBACK_FILENAME);
        assert_eq!(filename_from_url(&url("https://example.com")), FALLBACK_FILENAME);
        assert_eq!(filename_from_url(&url("https://example.com/...")), FALLBACK_FILENAME);
    }

    #[test]
    fn test_resolve_prefers_sanitized_hint() {
        let dir = TempDir::new().unwrap();
        let mut reserved = HashSet::new();
        let resolved = resolve_filename(
            &url("https://example.com/ignored.bin"),
            Some("my report.pdf"),
            dir.path(),
            &mut reserved,
        );
        assert_eq!(resolved.name, "my report.pdf");
        assert!(!resolved.extension_inferable);
        assert!(reserved.contains("my report.pdf"));
    }

    #[test]
    fn test_resolve_empty_hint_falls_back_to_url() {
        let dir = TempDir::new().unwrap();
        let mut reserved = HashSet::new();
        let resolved = resolve_filename(
            &url("https://example.com/data.json"),
            Some(" ... "),
            dir.path(),
            &mut reserved,
        );
        assert_eq!(resolved.name, "data.json");
    }

    #[test]
    fn test_resolve_marks_extensionless_url_names_inferable() {
        let dir = TempDir::new().unwrap();
        let mut reserved = HashSet::new();
        let resolved =
            resolve_filename(&url("https://example.com/export"), None, dir.path(), &mut reserved);
        assert_eq!(resolved.name, "export");
        assert!(resolved.extension_inferable);

        let resolved =
            resolve_filename(&url("https://example.com/data"), Some("data"), dir.path(), &mut reserved);
        assert!(!resolved.extension_inferable, "hinted names are never extended");
    }

    #[test]
    fn test_resolve_same_hint_twice_gets_suffixes_in_order() {
        let dir = TempDir::new().unwrap();
        let mut reserved = HashSet::new();
        let u = url("https://example.com/x");
        let names: Vec<String> = (0..3)
            .map(|_| resolve_filename(&u, Some("name.txt"), dir.path(), &mut reserved).name)
            .collect();
        assert_eq!(names, ["name.txt", "name (1).txt", "name (2).txt"]);
    }

    #[test]
    fn test_resolve_avoids_existing_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("test.pdf"), b"1").unwrap();
        std::fs::write(dir.path().join("test (1).pdf"), b"2").unwrap();

        let mut reserved = HashSet::new();
        let resolved = resolve_filename(
            &url("https://example.com/test.pdf"),
            None,
            dir.path(),
            &mut reserved,
        );
        assert_eq!(resolved.name, "test (2).pdf");
    }

    #[test]
    fn test_resolve_avoids_existing_directories() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("download")).unwrap();

        let mut reserved = HashSet::new();
        let resolved =
            resolve_filename(&url("https://example.com/"), None, dir.path(), &mut reserved);
        assert_eq!(resolved.name, "download (1)");
    }

    #[test]
    fn test_disambiguated_long_name_stays_within_limit() {
        let dir = TempDir::new().unwrap();
        let mut reserved = HashSet::new();
        let hint = format!("{}.txt", "b".repeat(260));
        let first = resolve_filename(&url("https://e.com/"), Some(&hint), dir.path(), &mut reserved);
        let second = resolve_filename(&url("https://e.com/"), Some(&hint), dir.path(), &mut reserved);
        assert_ne!(first.name, second.name);
        assert!(second.name.len() <= MAX_FILENAME_BYTES);
        assert!(second.name.ends_with(" (1).txt"), "got {}", second.name);
    }

    #[test]
    fn test_reservations_are_per_directory() {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();
        let u = url("https://example.com/same.txt");
        let mut table = NameReservations::new();

        assert_eq!(table.resolve(&u, None, a.path()).name, "same.txt");
        assert_eq!(table.resolve(&u, None, b.path()).name, "same.txt");
        assert_eq!(table.resolve(&u, None, a.path()).name, "same (1).txt");
        assert!(table.is_reserved(a.path(), "same (1).txt"));
        assert!(!table.is_reserved(b.path(), "same (1).txt"));

        let frozen = table.freeze();
        assert_eq!(frozen[a.path()].len(), 2);
        assert_eq!(frozen[b.path()].len(), 1);
    }

    #[test]
    fn test_extension_from_content_type() {
        assert_eq!(extension_from_content_type("application/pdf"), Some("pdf"));
        assert_eq!(extension_from_content_type("text/html; charset=utf-8"), Some("html"));
        assert_eq!(extension_from_content_type("Application/JSON"), Some("json"));
        assert_eq!(extension_from_content_type("application/octet-stream"), None);
        assert_eq!(extension_from_content_type(""), None);
    }

    #[test]
    fn test_with_extension() {
        assert_eq!(with_extension("export", "pdf"), "export.pdf");
        let long = "c".repeat(MAX_FILENAME_BYTES);
        let extended = with_extension(&long, "json");
        assert!(extended.len() <= MAX_FILENAME_BYTES);
        assert!(extended.ends_with(".json"));
    }
}
