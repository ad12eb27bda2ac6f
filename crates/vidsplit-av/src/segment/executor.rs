//! Segment execution: one independently encoded artifact per planned range.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{
    plan, AbortSignal, EncodingProfile, MediaBackend, MediaSource, SegmentPlan, SegmentRange,
};
use crate::{Error, Result};

/// Progress notifications emitted while a plan executes.
#[derive(Debug, Clone, Copy)]
pub enum SegmentEvent<'a> {
    /// Extraction of `range` is about to begin.
    Started { range: &'a SegmentRange, total: usize },
    /// `artifact` has been fully written.
    Written {
        artifact: &'a OutputArtifact,
        total: usize,
    },
}

/// Progress callback type.
pub type ProgressCallback = Box<dyn Fn(SegmentEvent<'_>) + Send + Sync>;

/// A produced segment file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputArtifact {
    /// 1-based index of the range this artifact holds.
    pub index: u32,
    /// File name shown to users (e.g. `holiday_part2.mp4`).
    pub display_name: String,
    /// Where the file was written.
    pub storage_path: PathBuf,
    /// Range start in seconds.
    pub start: f64,
    /// Range end in seconds.
    pub end: f64,
    /// Size of the written file.
    pub size_bytes: u64,
}

/// Names artifacts `{stem}_part{index}.{extension}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNaming {
    stem: String,
    extension: String,
}

impl ArtifactNaming {
    /// Create a naming scheme from a stem and extension (without the dot).
    pub fn new(stem: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            stem: stem.into(),
            extension: extension.into(),
        }
    }

    /// Derive the scheme from a source path's base name.
    pub fn for_source(source: &Path, extension: impl Into<String>) -> Self {
        Self::new(vidsplit_common::paths::base_name(source), extension)
    }

    /// File name for the 1-based `index`.
    pub fn name(&self, index: u32) -> String {
        format!("{}_part{}.{}", self.stem, index, self.extension)
    }
}

/// Result of splitting a file.
#[derive(Debug, Clone)]
pub struct SplitOutcome {
    /// The plan that was executed.
    pub plan: SegmentPlan,
    /// Artifacts in plan order.
    pub artifacts: Vec<OutputArtifact>,
}

/// Owns an open source and guarantees it is closed exactly once.
struct SourceGuard {
    source: Option<Box<dyn MediaSource>>,
}

impl SourceGuard {
    fn new(source: Box<dyn MediaSource>) -> Self {
        Self {
            source: Some(source),
        }
    }

    fn get(&mut self) -> Result<&mut Box<dyn MediaSource>> {
        self.source
            .as_mut()
            .ok_or_else(|| Error::invalid_argument("source already closed"))
    }

    fn close(&mut self) {
        if let Some(mut source) = self.source.take() {
            tracing::debug!("Closing source {:?}", source.path());
            source.close();
        }
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        self.close();
    }
}

/// Executes segment plans into an output directory.
///
/// Ranges are processed strictly in order; the next extraction starts only
/// after the previous artifact is in place. Each artifact is encoded into a
/// hidden temporary file next to its destination and renamed on success, so
/// a failed range leaves no partial file behind. Artifacts written before a
/// failure are kept.
pub struct SegmentExecutor {
    output_dir: PathBuf,
    profile: EncodingProfile,
    abort: AbortSignal,
    progress_callback: Option<ProgressCallback>,
}

impl SegmentExecutor {
    /// Create an executor writing into `output_dir` with the given profile.
    pub fn new(output_dir: impl Into<PathBuf>, profile: EncodingProfile) -> Self {
        Self {
            output_dir: output_dir.into(),
            profile,
            abort: AbortSignal::new(),
            progress_callback: None,
        }
    }

    /// Use an externally controlled abort signal.
    pub fn with_abort_signal(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    /// Receive a callback as each range starts and finishes.
    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    /// Get a clone of the abort signal for external control.
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    /// Directory artifacts are written into.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn report(&self, event: SegmentEvent<'_>) {
        if let Some(ref cb) = self.progress_callback {
            cb(event);
        }
    }

    /// Open `input`, plan it into `segment_secs` pieces and execute the plan.
    ///
    /// Artifacts are named after the input's base name with the profile's
    /// container as extension. `segment_secs` is validated before the source
    /// is opened.
    pub fn split(
        &self,
        backend: &dyn MediaBackend,
        input: &Path,
        segment_secs: u32,
    ) -> Result<SplitOutcome> {
        if segment_secs == 0 {
            return Err(Error::invalid_argument(
                "segment duration must be a positive number of seconds, got 0",
            ));
        }
        self.abort.check()?;

        tracing::info!(
            "Opening {:?} with {} backend ({}s segments)",
            input,
            backend.name(),
            segment_secs
        );
        let mut guard = SourceGuard::new(backend.open(input)?);

        let duration = guard.get()?.duration();
        let plan = plan(duration, segment_secs)?;
        tracing::info!(
            "Planned {} segment(s) over {:.3}s for {:?}",
            plan.len(),
            duration,
            input
        );

        let naming = ArtifactNaming::for_source(input, &self.profile.container);
        let artifacts = self.run(&mut guard, &plan, |index| naming.name(index))?;

        Ok(SplitOutcome { plan, artifacts })
    }

    /// Execute `plan` against an already-open `source`.
    ///
    /// The source is closed before this returns, whatever the outcome.
    pub fn execute<F>(
        &self,
        source: Box<dyn MediaSource>,
        plan: &SegmentPlan,
        naming: F,
    ) -> Result<Vec<OutputArtifact>>
    where
        F: Fn(u32) -> String,
    {
        let mut guard = SourceGuard::new(source);
        self.run(&mut guard, plan, naming)
    }

    fn run<F>(
        &self,
        guard: &mut SourceGuard,
        plan: &SegmentPlan,
        naming: F,
    ) -> Result<Vec<OutputArtifact>>
    where
        F: Fn(u32) -> String,
    {
        let result = self.run_ranges(guard, plan, naming);
        guard.close();
        result
    }

    fn run_ranges<F>(
        &self,
        guard: &mut SourceGuard,
        plan: &SegmentPlan,
        naming: F,
    ) -> Result<Vec<OutputArtifact>>
    where
        F: Fn(u32) -> String,
    {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| Error::io(&self.output_dir, e))?;

        let total = plan.len();
        let mut artifacts = Vec::with_capacity(total);

        for range in plan {
            self.abort.check()?;
            self.report(SegmentEvent::Started { range, total });

            let name = naming(range.index);
            let artifact = self
                .write_segment(guard.get()?.as_mut(), range, &name)
                .map_err(|e| e.in_segment(range))?;

            tracing::debug!(
                "Wrote segment {}/{} {:?} ({} bytes)",
                range.index,
                total,
                artifact.storage_path,
                artifact.size_bytes
            );
            self.report(SegmentEvent::Written {
                artifact: &artifact,
                total,
            });
            artifacts.push(artifact);
        }

        Ok(artifacts)
    }

    fn write_segment(
        &self,
        source: &mut dyn MediaSource,
        range: &SegmentRange,
        name: &str,
    ) -> Result<OutputArtifact> {
        if !vidsplit_common::paths::is_plain_file_name(name) {
            return Err(Error::invalid_argument(format!(
                "artifact name {name:?} is not a plain file name"
            )));
        }
        let final_path = self.output_dir.join(name);

        // Closed immediately so the encoder can open the path itself; the
        // TempPath still removes the file on drop unless persisted.
        let temp_path = tempfile::Builder::new()
            .prefix(&format!(".{name}."))
            .suffix(".partial")
            .tempfile_in(&self.output_dir)
            .map_err(|e| Error::io(&self.output_dir, e))?
            .into_temp_path();

        source.extract_and_encode(range, &temp_path, &self.profile, &self.abort)?;

        let size_bytes = std::fs::metadata(&temp_path)
            .map_err(|e| Error::io(&temp_path, e))?
            .len();
        if size_bytes == 0 {
            return Err(Error::encoding(
                "encoder",
                format!("segment {} produced an empty file", range.index),
            ));
        }

        temp_path
            .persist(&final_path)
            .map_err(|e| Error::io(&final_path, e.error))?;

        Ok(OutputArtifact {
            index: range.index,
            display_name: name.to_string(),
            storage_path: final_path,
            start: range.start,
            end: range.end,
            size_bytes,
        })
    }
}
