//! External tool detection.

use crate::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Information about an external tool.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    /// Name of the tool.
    pub name: String,
    /// Whether the tool is available.
    pub available: bool,
    /// First line of the version output, if available.
    pub version: Option<String>,
    /// Path to the tool executable.
    pub path: Option<PathBuf>,
}

/// Check if a tool is available using its `-version` flag.
///
/// # Example
///
/// ```no_run
/// use vidsplit_av::check_tool;
///
/// let info = check_tool("ffprobe");
/// if info.available {
///     println!("ffprobe version: {:?}", info.version);
/// }
/// ```
pub fn check_tool(name: &str) -> ToolInfo {
    check_tool_at(name, Path::new(name))
}

/// Check a tool at an explicit program path, reporting it under `name`.
pub fn check_tool_at(name: &str, program: &Path) -> ToolInfo {
    let result = Command::new(program).arg("-version").output();

    match result {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|s| s.to_string());

            let path = which::which(program).ok();

            ToolInfo {
                name: name.to_string(),
                available: true,
                version,
                path,
            }
        }
        _ => ToolInfo {
            name: name.to_string(),
            available: false,
            version: None,
            path: None,
        },
    }
}

/// Check the tools the ffmpeg backend depends on, at their configured
/// paths when given and on `PATH` otherwise.
pub fn check_tools(ffmpeg: Option<&Path>, ffprobe: Option<&Path>) -> Vec<ToolInfo> {
    [("ffmpeg", ffmpeg), ("ffprobe", ffprobe)]
        .into_iter()
        .map(|(name, path)| check_tool_at(name, path.unwrap_or(Path::new(name))))
        .collect()
}

/// Require that a tool is available on `PATH`, returning its path.
///
/// # Errors
///
/// Returns [`Error::ToolNotFound`] if the tool is not found.
pub fn require_tool(name: &str) -> Result<PathBuf> {
    which::which(name).map_err(|_| Error::tool_not_found(name))
}

/// Get the path to a tool, preferring a configured path over `PATH` lookup.
pub fn get_tool_path(name: &str, config_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = config_path {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        tracing::warn!(
            "Configured path for {} does not exist: {:?}, falling back to PATH",
            name,
            path
        );
    }

    require_tool(name)
}
