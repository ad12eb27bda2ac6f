//! Segment planning: turning a duration into contiguous time ranges.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Segment length used when a request does not give one.
pub const DEFAULT_SEGMENT_SECS: u32 = 60;

/// A plan never holds more ranges than this.
pub const MAX_SEGMENTS: u64 = 100_000;

/// Tolerance below which a trailing remainder is treated as float noise
/// rather than a real (sub-nanosecond) segment.
pub const SLIVER_TOLERANCE_SECS: f64 = 1e-9;

/// One time range of a plan.
///
/// `index` is 1-based and `0 <= start < end <= total_duration` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentRange {
    /// 1-based position in the plan.
    pub index: u32,
    /// Start time in seconds.
    pub start: f64,
    /// End time in seconds (exclusive).
    pub end: f64,
}

impl SegmentRange {
    /// Length of the range in seconds.
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// An ordered, gap-free, overlap-free cover of `[0, total_duration)`.
///
/// Built only through [`plan`]; immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentPlan {
    total_duration: f64,
    segment_secs: u32,
    ranges: Vec<SegmentRange>,
}

impl SegmentPlan {
    /// Total duration the plan covers.
    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    /// Requested segment length.
    pub fn segment_secs(&self) -> u32 {
        self.segment_secs
    }

    /// The ranges, in index order.
    pub fn ranges(&self) -> &[SegmentRange] {
        &self.ranges
    }

    /// Number of ranges (always at least one).
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Always false; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Iterate over the ranges in order.
    pub fn iter(&self) -> std::slice::Iter<'_, SegmentRange> {
        self.ranges.iter()
    }

    /// Whether the last range is shorter than the requested length.
    pub fn has_remainder(&self) -> bool {
        self.ranges
            .last()
            .map(|r| r.duration() < f64::from(self.segment_secs))
            .unwrap_or(false)
    }
}

impl<'a> IntoIterator for &'a SegmentPlan {
    type Item = &'a SegmentRange;
    type IntoIter = std::slice::Iter<'a, SegmentRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}

/// Validate a requested segment length.
///
/// Accepts a signed value so callers parsing user input can pass it through
/// unchanged and get a uniform error for zero and negative values.
pub fn validate_segment_secs(segment_secs: i64) -> Result<u32> {
    if segment_secs <= 0 {
        return Err(Error::invalid_argument(format!(
            "segment duration must be a positive number of seconds, got {segment_secs}"
        )));
    }
    u32::try_from(segment_secs).map_err(|_| {
        Error::invalid_argument(format!(
            "segment duration {segment_secs}s is larger than {}s",
            u32::MAX
        ))
    })
}

/// A validated segment length in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SegmentRequest {
    segment_secs: u32,
}

impl SegmentRequest {
    /// Validate a numeric request.
    pub fn new(segment_secs: i64) -> Result<Self> {
        Ok(Self {
            segment_secs: validate_segment_secs(segment_secs)?,
        })
    }

    /// Parse user-supplied text such as a form field.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let secs: i64 = raw.parse().map_err(|_| {
            Error::invalid_argument(format!(
                "segment duration {raw:?} is not a whole number of seconds"
            ))
        })?;
        Self::new(secs)
    }

    pub fn segment_secs(&self) -> u32 {
        self.segment_secs
    }
}

impl Default for SegmentRequest {
    fn default() -> Self {
        Self {
            segment_secs: DEFAULT_SEGMENT_SECS,
        }
    }
}

/// Split `[0, total_duration)` into consecutive ranges of `segment_secs`.
///
/// The final range ends exactly at `total_duration` and may be shorter than
/// `segment_secs`. The result depends only on the two arguments.
///
/// A total that overshoots a multiple of `segment_secs` by less than
/// [`SLIVER_TOLERANCE_SECS`] does not get a trailing sliver: the plan has
/// `ceil(total / secs) - 1` ranges and the last one absorbs the overshoot.
/// For example `plan(120.0000000001, 60)` yields two ranges, the second
/// ending at `120.0000000001`.
///
/// # Errors
///
/// [`Error::InvalidArgument`] if `segment_secs` is zero, if `total_duration`
/// is not a positive finite number, or if the plan would exceed
/// [`MAX_SEGMENTS`] ranges.
///
/// # Example
///
/// ```
/// use vidsplit_av::segment::plan;
///
/// let plan = plan(150.0, 60)?;
/// let bounds: Vec<_> = plan.iter().map(|r| (r.index, r.start, r.end)).collect();
/// assert_eq!(bounds, vec![(1, 0.0, 60.0), (2, 60.0, 120.0), (3, 120.0, 150.0)]);
/// # Ok::<(), vidsplit_av::Error>(())
/// ```
pub fn plan(total_duration: f64, segment_secs: u32) -> Result<SegmentPlan> {
    if segment_secs == 0 {
        return Err(Error::invalid_argument(
            "segment duration must be a positive number of seconds, got 0",
        ));
    }
    if !total_duration.is_finite() || total_duration <= 0.0 {
        return Err(Error::invalid_argument(format!(
            "media duration must be a positive number of seconds, got {total_duration}"
        )));
    }

    let step = f64::from(segment_secs);
    let count = ((total_duration - SLIVER_TOLERANCE_SECS) / step).ceil().max(1.0);
    if count > MAX_SEGMENTS as f64 {
        return Err(Error::invalid_argument(format!(
            "{total_duration}s split every {segment_secs}s needs {count} segments, \
             more than {MAX_SEGMENTS}"
        )));
    }
    let count = count as u32;

    let ranges = (0..count)
        .map(|i| SegmentRange {
            index: i + 1,
            start: f64::from(i) * step,
            end: if i + 1 == count {
                total_duration
            } else {
                f64::from(i + 1) * step
            },
        })
        .collect();

    Ok(SegmentPlan {
        total_duration,
        segment_secs,
        ranges,
    })
}
