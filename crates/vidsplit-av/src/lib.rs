//! Segment planning and extraction for vidsplit.
//!
//! This crate turns a video into fixed-duration segments:
//!
//! - [`segment::plan`] computes contiguous time ranges covering a duration
//! - [`SegmentExecutor`] produces one encoded artifact per range through a
//!   [`MediaBackend`], writing each file atomically
//! - [`FfmpegBackend`] is the production backend built on `ffmpeg`/`ffprobe`
//! - [`probe`] and [`tools`] cover media inspection and tool discovery
//!
//! ```no_run
//! use std::path::Path;
//! use vidsplit_av::{EncodingProfile, FfmpegBackend, SegmentExecutor};
//!
//! let backend = FfmpegBackend::discover(None, None)?;
//! let outcome = SegmentExecutor::new("segments", EncodingProfile::default())
//!     .split(&backend, Path::new("holiday.mov"), 60)?;
//! for artifact in &outcome.artifacts {
//!     println!("{} -> {}", artifact.display_name, artifact.storage_path.display());
//! }
//! # Ok::<(), vidsplit_av::Error>(())
//! ```

pub mod command;
mod error;
pub mod ffmpeg;
pub mod probe;
pub mod segment;
pub mod tools;

pub use error::{Error, ErrorKind, Result};
pub use ffmpeg::FfmpegBackend;
pub use probe::{MediaInfo, StreamInfo};
pub use segment::{
    plan, AbortSignal, ArtifactNaming, EncodingProfile, MediaBackend, MediaSource, OutputArtifact,
    SegmentEvent, SegmentExecutor, SegmentPlan, SegmentRange, SegmentRequest, SplitOutcome,
};
pub use tools::{check_tool, check_tool_at, check_tools, get_tool_path, require_tool, ToolInfo};
