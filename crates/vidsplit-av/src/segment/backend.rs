//! Capability interface over the media decode/encode library.
//!
//! The planner and executor only ever talk to these traits, so they can be
//! driven by [`crate::FfmpegBackend`] in production and by a fake in tests.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::SegmentRange;
use crate::{Error, Result};

/// Opens sources for splitting.
pub trait MediaBackend: Send + Sync {
    /// Short name for logs (e.g. "ffmpeg").
    fn name(&self) -> &'static str;

    /// Open `path` read-only and determine its duration.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] if the file cannot be read, [`Error::UnsupportedMedia`]
    /// if it has no usable duration or video stream.
    fn open(&self, path: &Path) -> Result<Box<dyn MediaSource>>;
}

/// An opened source media handle.
///
/// [`MediaSource::close`] is called exactly once by the executor, after the
/// last segment or on the first failure.
pub trait MediaSource: Send {
    /// Path the source was opened from.
    fn path(&self) -> &Path;

    /// Total duration in seconds.
    fn duration(&self) -> f64;

    /// Extract `range` and encode it into a complete file at `output`.
    ///
    /// Implementations must watch `abort` for long-running work and return
    /// [`Error::Aborted`] once it is raised.
    fn extract_and_encode(
        &mut self,
        range: &SegmentRange,
        output: &Path,
        profile: &EncodingProfile,
        abort: &AbortSignal,
    ) -> Result<()>;

    /// Release the handle.
    fn close(&mut self);
}

/// Fixed output encoding, independent of the source's codecs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingProfile {
    /// Video encoder (default: libx264).
    pub video_codec: String,
    /// Audio encoder (default: aac).
    pub audio_codec: String,
    /// Output container format and file extension (default: mp4).
    pub container: String,
    /// Extra encoder arguments inserted before the output options.
    pub extra_args: Vec<String>,
}

impl Default for EncodingProfile {
    fn default() -> Self {
        Self {
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            container: "mp4".to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// Shared token that asks a running split to stop.
///
/// Cloning shares the token. Raising it is sticky.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal(CancellationToken);

impl AbortSignal {
    /// Create a new, lowered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal.
    pub fn abort(&self) {
        self.0.cancel();
    }

    /// Whether the signal has been raised.
    pub fn is_aborted(&self) -> bool {
        self.0.is_cancelled()
    }

    /// Resolves once the signal is raised.
    pub async fn aborted(&self) {
        self.0.cancelled().await
    }

    /// `Err(Error::Aborted)` once raised.
    pub fn check(&self) -> Result<()> {
        if self.is_aborted() {
            Err(Error::Aborted)
        } else {
            Ok(())
        }
    }
}
