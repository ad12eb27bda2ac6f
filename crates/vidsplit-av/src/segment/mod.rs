//! Segment planning and execution.
//!
//! [`plan`] turns a duration into contiguous ranges; [`SegmentExecutor`]
//! produces one artifact per range through a [`MediaBackend`].

mod backend;
mod executor;
mod plan;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use backend::{AbortSignal, EncodingProfile, MediaBackend, MediaSource};
pub use executor::{
    ArtifactNaming, OutputArtifact, ProgressCallback, SegmentEvent, SegmentExecutor, SplitOutcome,
};
pub use plan::{
    plan, validate_segment_secs, SegmentPlan, SegmentRange, SegmentRequest, DEFAULT_SEGMENT_SECS,
    MAX_SEGMENTS,
};
