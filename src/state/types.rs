use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use vidsplit_av::{ErrorKind, OutputArtifact};
use vidsplit_common::JobId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    /// Source video being split
    pub file_path: PathBuf,
    pub file_name: String,
    pub segment_secs: u32,
    /// Directory the segments are written into
    pub output_dir: PathBuf,
    pub status: JobStatus,
    pub progress: f32,
    pub current_step: Option<String>,
    /// Number of planned segments, known once the job starts
    pub total_segments: Option<u32>,
    /// Segments written so far, in plan order
    pub segments: Vec<SegmentArtifact>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// 1-based index of the segment that failed, if the failure was per-segment
    pub failed_segment: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub source: JobSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Whether the job has reached a final state.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobSource {
    /// Multipart upload through `/upload`
    Upload,
    /// File already on disk, submitted through the API
    Api,
}

/// A written segment as exposed to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentArtifact {
    pub index: u32,
    /// Display name, also the last component of the download URL
    pub name: String,
    pub path: PathBuf,
    pub download_url: String,
    pub start: f64,
    pub end: f64,
    pub size_bytes: u64,
}

impl SegmentArtifact {
    pub fn from_output(job_id: JobId, artifact: &OutputArtifact) -> Self {
        Self {
            index: artifact.index,
            name: artifact.display_name.clone(),
            path: artifact.storage_path.clone(),
            download_url: download_url(job_id, &artifact.display_name),
            start: artifact.start,
            end: artifact.end,
            size_bytes: artifact.size_bytes,
        }
    }
}

/// Bytes left as-is in a URL path segment or RFC 5987 header value.
pub const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// URL path a segment is served from. The name is percent-encoded.
pub fn download_url(job_id: JobId, name: &str) -> String {
    format!("/download/{}/{}", job_id, utf8_percent_encode(name, UNRESERVED))
}

impl Job {
    pub fn new(
        id: JobId,
        file_path: PathBuf,
        segment_secs: u32,
        output_dir: PathBuf,
        source: JobSource,
    ) -> Self {
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        Self {
            id,
            file_path,
            file_name,
            segment_secs,
            output_dir,
            status: JobStatus::Queued,
            progress: 0.0,
            current_step: None,
            total_segments: None,
            segments: Vec::new(),
            error: None,
            error_kind: None,
            failed_segment: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            source,
        }
    }

    pub fn start(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(Utc::now());
    }

    pub fn update_progress(&mut self, progress: f32, step: &str) {
        self.progress = progress.clamp(0.0, 100.0);
        self.current_step = Some(step.to_string());
    }

    pub fn add_segment(&mut self, segment: SegmentArtifact) {
        self.segments.retain(|s| s.index != segment.index);
        self.segments.push(segment);
        self.segments.sort_by_key(|s| s.index);
    }

    pub fn complete(&mut self) {
        self.status = JobStatus::Completed;
        self.progress = 100.0;
        self.current_step = None;
        self.completed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, failure: &JobFailure) {
        self.status = JobStatus::Failed;
        self.current_step = None;
        self.error = Some(failure.message.clone());
        self.error_kind = failure.kind;
        self.failed_segment = failure.failed_segment;
        self.completed_at = Some(Utc::now());
    }

    pub fn cancel(&mut self) {
        self.status = JobStatus::Cancelled;
        self.current_step = None;
        self.error_kind = Some(ErrorKind::Aborted);
        self.completed_at = Some(Utc::now());
    }

    /// Put a finished job back into its initial queued state.
    pub fn reset(&mut self) {
        self.status = JobStatus::Queued;
        self.progress = 0.0;
        self.current_step = None;
        self.total_segments = None;
        self.segments.clear();
        self.error = None;
        self.error_kind = None;
        self.failed_segment = None;
        self.started_at = None;
        self.completed_at = None;
    }

    /// Total bytes of the segments written so far.
    pub fn bytes_written(&self) -> u64 {
        self.segments.iter().map(|s| s.size_bytes).sum()
    }
}

/// Why a job failed, as reported to clients.
#[derive(Debug, Clone, PartialEq)]
pub struct JobFailure {
    pub message: String,
    pub kind: Option<ErrorKind>,
    pub failed_segment: Option<u32>,
}

impl JobFailure {
    /// A failure that did not come from the segmenter (panics, join errors).
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
            failed_segment: None,
        }
    }
}

impl From<&vidsplit_av::Error> for JobFailure {
    fn from(e: &vidsplit_av::Error) -> Self {
        Self {
            message: e.to_string(),
            kind: Some(e.kind()),
            failed_segment: e.failed_segment(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobStats {
    pub total_processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub segments_written: u64,
    pub total_bytes_written: u64,
}

impl JobStats {
    pub fn success_rate(&self) -> f32 {
        if self.total_processed == 0 {
            return 0.0;
        }
        (self.successful as f32 / self.total_processed as f32) * 100.0
    }

    pub fn record_success(&mut self, segments: u64, bytes: u64) {
        self.total_processed += 1;
        self.successful += 1;
        self.segments_written += segments;
        self.total_bytes_written += bytes;
    }

    pub fn record_failure(&mut self) {
        self.total_processed += 1;
        self.failed += 1;
    }

    pub fn record_cancelled(&mut self) {
        self.total_processed += 1;
        self.cancelled += 1;
    }
}
