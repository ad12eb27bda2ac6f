//! In-memory [`MediaBackend`] for tests.
//!
//! Counts opens and closes, records every extracted range, and can be told
//! to fail or stall on a given segment.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{AbortSignal, EncodingProfile, MediaBackend, MediaSource, SegmentRange};
use crate::{Error, Result};

/// Failure a [`FakeBackend`] injects on one segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeFailure {
    /// Encoder error.
    Encoding,
    /// Write error on the output path.
    Io,
    /// Encoder "succeeds" but writes nothing.
    EmptyOutput,
    /// Raises the abort signal mid-extraction.
    AbortDuring,
}

#[derive(Debug, Default)]
struct Counters {
    opens: usize,
    closes: usize,
    extracted: Vec<(u32, f64, f64)>,
}

/// Test backend with a fixed source duration.
#[derive(Debug, Clone)]
pub struct FakeBackend {
    duration: f64,
    fail_on: Option<(u32, FakeFailure)>,
    fail_open: bool,
    delay: Duration,
    counters: Arc<Mutex<Counters>>,
}

impl FakeBackend {
    /// Every opened source reports `duration` seconds.
    pub fn new(duration: f64) -> Self {
        Self {
            duration,
            fail_on: None,
            fail_open: false,
            delay: Duration::ZERO,
            counters: Arc::default(),
        }
    }

    /// Inject `failure` when segment `index` is extracted.
    pub fn fail_on(mut self, index: u32, failure: FakeFailure) -> Self {
        self.fail_on = Some((index, failure));
        self
    }

    /// Make `open` fail as if the file did not exist.
    pub fn fail_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    /// Spend `delay` on each segment, watching the abort signal.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of successful opens.
    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    /// Number of closes.
    pub fn closes(&self) -> usize {
        self.lock().closes
    }

    /// `(index, start, end)` of every extraction attempt, in order.
    pub fn extracted(&self) -> Vec<(u32, f64, f64)> {
        self.lock().extracted.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl MediaBackend for FakeBackend {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn open(&self, path: &Path) -> Result<Box<dyn MediaSource>> {
        if self.fail_open {
            return Err(Error::io(
                path,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
            ));
        }
        self.lock().opens += 1;
        Ok(Box::new(FakeSource {
            backend: self.clone(),
            path: path.to_path_buf(),
        }))
    }
}

struct FakeSource {
    backend: FakeBackend,
    path: PathBuf,
}

impl FakeSource {
    fn stall(&self, abort: &AbortSignal) -> Result<()> {
        let step = Duration::from_millis(5);
        let mut waited = Duration::ZERO;
        while waited < self.backend.delay {
            abort.check()?;
            std::thread::sleep(step);
            waited += step;
        }
        abort.check()
    }
}

impl MediaSource for FakeSource {
    fn path(&self) -> &Path {
        &self.path
    }

    fn duration(&self) -> f64 {
        self.backend.duration
    }

    fn extract_and_encode(
        &mut self,
        range: &SegmentRange,
        output: &Path,
        profile: &EncodingProfile,
        abort: &AbortSignal,
    ) -> Result<()> {
        self.backend
            .lock()
            .extracted
            .push((range.index, range.start, range.end));

        self.stall(abort)?;

        match self.backend.fail_on {
            Some((index, failure)) if index == range.index => match failure {
                FakeFailure::Encoding => Err(Error::encoding("fake", "injected encoder failure")),
                FakeFailure::Io => Err(Error::io(
                    output,
                    std::io::Error::new(std::io::ErrorKind::Other, "injected write failure"),
                )),
                FakeFailure::EmptyOutput => std::fs::write(output, b"")
                    .map_err(|e| Error::io(output, e)),
                FakeFailure::AbortDuring => {
                    abort.abort();
                    Err(Error::Aborted)
                }
            },
            _ => {
                let body = format!(
                    "{} {} {:.3}-{:.3} {}",
                    profile.video_codec,
                    profile.audio_codec,
                    range.start,
                    range.end,
                    self.path.display()
                );
                std::fs::write(output, body).map_err(|e| Error::io(output, e))
            }
        }
    }

    fn close(&mut self) {
        self.backend.lock().closes += 1;
    }
}
