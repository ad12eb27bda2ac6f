//! Media probing.
//!
//! Only what the segmenter needs is extracted: container, duration and the
//! first video/audio stream codecs.

mod ffprobe;

pub use ffprobe::{parse_ffprobe_json, probe_with_ffprobe};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Information about a media file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Path to the media file.
    pub file_path: PathBuf,
    /// File size in bytes.
    pub file_size: u64,
    /// Container format as reported by the prober (e.g. "mov,mp4,m4a,3gp,3g2,mj2").
    pub container: String,
    /// Duration of the media.
    pub duration: Option<Duration>,
    /// Primary video stream, if any.
    pub video: Option<StreamInfo>,
    /// Primary audio stream, if any.
    pub audio: Option<StreamInfo>,
}

/// Summary of a single stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamInfo {
    /// Stream index in the container.
    pub index: u32,
    /// Codec name (e.g. "h264", "aac").
    pub codec: String,
    /// Width in pixels (video only).
    pub width: Option<u32>,
    /// Height in pixels (video only).
    pub height: Option<u32>,
}

impl MediaInfo {
    /// Duration in fractional seconds, if known.
    pub fn duration_secs(&self) -> Option<f64> {
        self.duration.map(|d| d.as_secs_f64())
    }

    /// Check if the file has a video stream.
    pub fn has_video(&self) -> bool {
        self.video.is_some()
    }

    /// Check if the file has an audio stream.
    pub fn has_audio(&self) -> bool {
        self.audio.is_some()
    }
}
