use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

const DEFAULT_RECORDING_NAME: &str = "recording";

static UNSAFE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\s/\\:*?"<>|]+"#).unwrap());

/// Turn a recording's display name into a directory/file stem.
///
/// Every run of whitespace or path-hostile characters collapses into a single
/// `_`; leading and trailing dots are removed so the result can never be `.`
/// or `..`.
pub fn sanitize_recording_name(name: &str) -> String {
    let replaced = UNSAFE_RUN.replace_all(name, "_");
    let trimmed = replaced.trim_matches('.');
    if trimmed.is_empty() {
        DEFAULT_RECORDING_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Ensure a directory exists, creating it (recursively) if needed.
pub async fn ensure_dir(path: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(path).await
}

/// Size of `path` if it is a regular file with at least one byte.
///
/// Missing files, directories and zero-length files all count as absent.
pub async fn non_empty_file_len(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Some(meta.len()),
        _ => None,
    }
}
