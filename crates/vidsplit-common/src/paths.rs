//! Path utilities for upload validation and job-scoped storage.
//!
//! Uploaded files and produced segments live in two sibling directories.
//! Every job gets its own subdirectory in each, named after its [`JobId`].

use crate::JobId;
use std::path::{Path, PathBuf};
use unicode_normalization::UnicodeNormalization;

/// Extensions accepted for upload unless configured otherwise.
const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv"];

/// Get the default list of accepted upload extensions.
///
/// # Examples
///
/// ```
/// use vidsplit_common::paths::default_allowed_extensions;
///
/// assert!(default_allowed_extensions().contains(&"mkv"));
/// ```
#[must_use]
pub fn default_allowed_extensions() -> &'static [&'static str] {
    DEFAULT_ALLOWED_EXTENSIONS
}

/// Check if a path's extension is in `allowed` (case-insensitive).
///
/// A name without a dot, or with an empty extension, is never allowed.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use vidsplit_common::paths::has_allowed_extension;
///
/// assert!(has_allowed_extension(Path::new("movie.MOV"), &["mov"]));
/// assert!(!has_allowed_extension(Path::new("movie"), &["mov"]));
/// ```
pub fn has_allowed_extension<S: AsRef<str>>(path: &Path, allowed: &[S]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            allowed
                .iter()
                .any(|a| a.as_ref().eq_ignore_ascii_case(&ext))
        })
        .unwrap_or(false)
}

/// Reduce a client-supplied filename to a safe, flat ASCII name.
///
/// The name is NFKD-normalized first, so `é` keeps its base letter `e`
/// once the combining accent is dropped. Path separators become word
/// breaks, whitespace runs become `_`, anything outside `[A-Za-z0-9._-]` is
/// dropped and leading/trailing `.`/`_` are trimmed. Returns `None` if
/// nothing usable is left.
///
/// # Examples
///
/// ```
/// use vidsplit_common::paths::sanitize_filename;
///
/// assert_eq!(sanitize_filename("My Holiday.mp4").as_deref(), Some("My_Holiday.mp4"));
/// assert_eq!(sanitize_filename("../../etc/passwd").as_deref(), Some("etc_passwd"));
/// assert_eq!(sanitize_filename("..."), None);
/// ```
pub fn sanitize_filename(name: &str) -> Option<String> {
    let spaced: String = name
        .nfkd()
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");

    let filtered: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    let trimmed = filtered.trim_matches(|c| c == '.' || c == '_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Check that `name` is a single plain path component.
///
/// Used to reject traversal attempts in download requests.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Directory holding everything a job writes under `base`.
pub fn job_dir(base: &Path, job_id: JobId) -> PathBuf {
    base.join(job_id.to_string())
}

/// File stem used for artifact naming, `"output"` if the path has none.
pub fn base_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("output")
        .to_string()
}
