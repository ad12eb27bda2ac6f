//! Production [`MediaBackend`] driving the ffmpeg and ffprobe executables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::command::ToolCommand;
use crate::probe::{probe_with_ffprobe, MediaInfo};
use crate::segment::{AbortSignal, EncodingProfile, MediaBackend, MediaSource, SegmentRange};
use crate::tools::get_tool_path;
use crate::{Error, Result};

/// Default upper bound for encoding a single segment.
pub const DEFAULT_SEGMENT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Splits media with `ffmpeg`, probing durations with `ffprobe`.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    segment_timeout: Duration,
}

impl FfmpegBackend {
    /// Use the given executables as-is.
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            segment_timeout: DEFAULT_SEGMENT_TIMEOUT,
        }
    }

    /// Resolve both tools, preferring configured paths over `PATH`.
    ///
    /// # Errors
    ///
    /// [`Error::ToolNotFound`] if either tool cannot be located.
    pub fn discover(ffmpeg: Option<&Path>, ffprobe: Option<&Path>) -> Result<Self> {
        Ok(Self::new(
            get_tool_path("ffmpeg", ffmpeg)?,
            get_tool_path("ffprobe", ffprobe)?,
        ))
    }

    /// Limit how long a single segment may take to encode.
    pub fn with_segment_timeout(mut self, timeout: Duration) -> Self {
        self.segment_timeout = timeout;
        self
    }

    /// Path of the ffmpeg executable.
    pub fn ffmpeg_path(&self) -> &Path {
        &self.ffmpeg
    }

    /// Path of the ffprobe executable.
    pub fn ffprobe_path(&self) -> &Path {
        &self.ffprobe
    }

    /// Probe `path` without opening it for splitting.
    pub fn probe(&self, path: &Path) -> Result<MediaInfo> {
        probe_with_ffprobe(&self.ffprobe, path)
    }
}

impl MediaBackend for FfmpegBackend {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn MediaSource>> {
        let metadata = std::fs::metadata(path).map_err(|e| Error::io(path, e))?;
        if !metadata.is_file() {
            return Err(Error::unsupported_media(path, "not a regular file"));
        }

        let info = self.probe(path)?;
        let duration = info
            .duration_secs()
            .ok_or_else(|| Error::unsupported_media(path, "duration could not be determined"))?;
        if !info.has_video() {
            return Err(Error::unsupported_media(path, "no video stream"));
        }

        tracing::debug!(
            "Opened {:?}: {} ({:.3}s, video {:?}, audio {:?})",
            path,
            info.container,
            duration,
            info.video.as_ref().map(|s| s.codec.as_str()),
            info.audio.as_ref().map(|s| s.codec.as_str())
        );

        Ok(Box::new(FfmpegSource {
            ffmpeg: self.ffmpeg.clone(),
            path: path.to_path_buf(),
            duration,
            segment_timeout: self.segment_timeout,
            closed: false,
        }))
    }
}

/// A probed input; each segment is a separate ffmpeg run over it.
struct FfmpegSource {
    ffmpeg: PathBuf,
    path: PathBuf,
    duration: f64,
    segment_timeout: Duration,
    closed: bool,
}

impl FfmpegSource {
    fn build_command(
        &self,
        range: &SegmentRange,
        output: &Path,
        profile: &EncodingProfile,
    ) -> ToolCommand {
        let mut cmd = ToolCommand::new(self.ffmpeg.clone());
        cmd.args(["-hide_banner", "-loglevel", "error", "-nostdin", "-y"]);
        // Input seeking: fast, and accurate because we re-encode.
        cmd.arg("-ss").arg(format!("{:.3}", range.start));
        cmd.arg("-i").arg(self.path.to_string_lossy());
        cmd.arg("-t").arg(format!("{:.3}", range.duration()));
        cmd.arg("-map").arg("0:v:0").arg("-map").arg("0:a:0?");
        cmd.arg("-c:v").arg(&profile.video_codec);
        cmd.arg("-c:a").arg(&profile.audio_codec);
        cmd.args(profile.extra_args.iter().cloned());
        if profile.container == "mp4" || profile.container == "mov" {
            cmd.arg("-movflags").arg("+faststart");
        }
        cmd.arg("-f").arg(&profile.container);
        cmd.arg(output.to_string_lossy());
        cmd.timeout(self.segment_timeout);
        cmd
    }
}

impl MediaSource for FfmpegSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn extract_and_encode(
        &mut self,
        range: &SegmentRange,
        output: &Path,
        profile: &EncodingProfile,
        abort: &AbortSignal,
    ) -> Result<()> {
        if self.closed {
            return Err(Error::invalid_argument("source is closed"));
        }
        let cmd = self.build_command(range, output, profile);
        tracing::debug!("Running ffmpeg {}", cmd.get_args().join(" "));
        cmd.execute(abort)?;
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            tracing::debug!("Released {:?}", self.path);
        }
    }
}
