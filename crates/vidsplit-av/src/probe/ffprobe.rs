//! FFprobe-based media probing.

use super::{MediaInfo, StreamInfo};
use crate::command::ToolCommand;
use crate::segment::AbortSignal;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Probing a file header should never take long.
const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    #[serde(default)]
    format_name: String,
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    index: u32,
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
}

/// Probe a media file using the ffprobe executable at `ffprobe`.
pub fn probe_with_ffprobe(ffprobe: &Path, path: &Path) -> Result<MediaInfo> {
    let output = ToolCommand::new(ffprobe.to_path_buf())
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path.to_string_lossy())
        .timeout(PROBE_TIMEOUT)
        .execute(&AbortSignal::new())
        .map_err(|e| match e {
            // ffprobe refuses files it cannot demux; that is a property of
            // the input, not an encoder failure.
            Error::Encoding { message, .. } => Error::unsupported_media(path, message),
            other => other,
        })?;

    parse_ffprobe_json(path, &output.stdout)
}

/// Parse ffprobe's `-print_format json` output.
///
/// The container duration is preferred; if it is missing the longest stream
/// duration is used instead.
pub fn parse_ffprobe_json(path: &Path, json: &str) -> Result<MediaInfo> {
    let output: FfprobeOutput =
        serde_json::from_str(json).map_err(|e| Error::parse_error("ffprobe", e.to_string()))?;

    let format = output.format.ok_or_else(|| {
        Error::unsupported_media(path, "ffprobe reported no container format")
    })?;

    let stream_duration = output
        .streams
        .iter()
        .filter_map(|s| s.duration.as_deref().and_then(parse_seconds))
        .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.max(d))));

    let duration = format
        .duration
        .as_deref()
        .and_then(parse_seconds)
        .or(stream_duration)
        .map(|secs| {
            Duration::try_from_secs_f64(secs).map_err(|_| {
                Error::unsupported_media(path, format!("duration {secs}s is out of range"))
            })
        })
        .transpose()?;

    let first_of = |kind: &str| {
        output
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some(kind))
            .map(|s| StreamInfo {
                index: s.index,
                codec: s.codec_name.clone().unwrap_or_else(|| "unknown".to_string()),
                width: s.width,
                height: s.height,
            })
    };

    Ok(MediaInfo {
        file_path: path.to_path_buf(),
        file_size: format.size.and_then(|s| s.parse().ok()).unwrap_or(0),
        container: format.format_name,
        duration,
        video: first_of("video"),
        audio: first_of("audio"),
    })
}

fn parse_seconds(s: &str) -> Option<f64> {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|d| d.is_finite() && *d > 0.0)
}
