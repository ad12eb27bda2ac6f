//! Error types for vidsplit-av.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::segment::SegmentRange;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], stable enough to report to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad segment duration, bad media duration, or media that cannot be split.
    InvalidArgument,
    /// The source could not be read or an artifact could not be written.
    IoFailure,
    /// The decode/encode step failed.
    EncodingFailure,
    /// The operation was stopped through an abort signal.
    Aborted,
}

/// Errors that can occur while planning or executing a split.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The source opened but cannot be segmented (no duration, no video).
    #[error("unsupported media {}: {reason}", path.display())]
    UnsupportedMedia { path: PathBuf, reason: String },

    /// A required external tool is not available.
    #[error("tool not found: {tool}")]
    ToolNotFound { tool: String },

    /// An I/O error occurred on a specific path.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An external encoder failed.
    #[error("encoding failed: {tool}: {message}")]
    Encoding { tool: String, message: String },

    /// Failed to parse tool output.
    #[error("failed to parse {tool} output: {message}")]
    ParseError { tool: String, message: String },

    /// Stopped by an abort signal.
    #[error("operation aborted")]
    Aborted,

    /// A failure while producing one segment of a plan.
    #[error("segment {index} ({start:.3}s-{end:.3}s) failed: {source}")]
    Segment {
        index: u32,
        start: f64,
        end: f64,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create an unsupported media error.
    pub fn unsupported_media(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::UnsupportedMedia {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a tool not found error.
    pub fn tool_not_found(tool: impl Into<String>) -> Self {
        Self::ToolNotFound { tool: tool.into() }
    }

    /// Create an I/O error tied to a path.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Create an encoding error.
    pub fn encoding(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Encoding {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a parse error.
    pub fn parse_error(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Attach the range being produced when this error happened.
    pub fn in_segment(self, range: &SegmentRange) -> Self {
        match self {
            already @ Self::Segment { .. } => already,
            other => Self::Segment {
                index: range.index,
                start: range.start,
                end: range.end,
                source: Box::new(other),
            },
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) | Self::UnsupportedMedia { .. } => ErrorKind::InvalidArgument,
            Self::ToolNotFound { .. } | Self::Io { .. } => ErrorKind::IoFailure,
            Self::Encoding { .. } | Self::ParseError { .. } => ErrorKind::EncodingFailure,
            Self::Aborted => ErrorKind::Aborted,
            Self::Segment { source, .. } => source.kind(),
        }
    }

    /// 1-based index of the segment that failed, if the failure was per-segment.
    pub fn failed_segment(&self) -> Option<u32> {
        match self {
            Self::Segment { index, .. } => Some(*index),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_classification() {
        assert_eq!(
            Error::invalid_argument("zero").kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            Error::unsupported_media("/a.mp4", "no duration").kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            Error::io("/out", std::io::Error::other("disk full")).kind(),
            ErrorKind::IoFailure
        );
        assert_eq!(Error::tool_not_found("ffmpeg").kind(), ErrorKind::IoFailure);
        assert_eq!(
            Error::encoding("ffmpeg", "boom").kind(),
            ErrorKind::EncodingFailure
        );
        assert_eq!(Error::Aborted.kind(), ErrorKind::Aborted);
    }

    #[test]
    fn test_segment_context() {
        let range = SegmentRange {
            index: 2,
            start: 60.0,
            end: 120.0,
        };
        let err = Error::encoding("ffmpeg", "invalid data").in_segment(&range);
        assert_eq!(err.failed_segment(), Some(2));
        assert_eq!(err.kind(), ErrorKind::EncodingFailure);
        assert_eq!(
            err.to_string(),
            "segment 2 (60.000s-120.000s) failed: encoding failed: ffmpeg: invalid data"
        );

        // Wrapping twice keeps the innermost range.
        let other = SegmentRange {
            index: 3,
            start: 120.0,
            end: 150.0,
        };
        assert_eq!(err.in_segment(&other).failed_segment(), Some(2));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::EncodingFailure).unwrap();
        assert_eq!(json, "\"encoding_failure\"");
    }
}
