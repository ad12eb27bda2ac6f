//! Background worker that splits queued jobs.

use crate::config::Config;
use crate::state::{AppState, Job, JobFailure, SegmentArtifact};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use vidsplit_av::{ErrorKind, MediaBackend, SegmentEvent, SegmentExecutor};

/// How often the queue is re-checked when no notification arrives.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Job processor that runs the segment executor for queued jobs
pub struct JobProcessor {
    state: Arc<AppState>,
    config: Arc<Config>,
    backend: Arc<dyn MediaBackend>,
    shutdown_rx: mpsc::Receiver<()>,
    permits: Arc<Semaphore>,
    workers: JoinSet<()>,
}

impl JobProcessor {
    pub fn new(
        state: Arc<AppState>,
        config: Arc<Config>,
        backend: Arc<dyn MediaBackend>,
        shutdown_rx: mpsc::Receiver<()>,
    ) -> Self {
        let permits = Arc::new(Semaphore::new(config.jobs.max_concurrent.max(1)));
        Self {
            state,
            config,
            backend,
            shutdown_rx,
            permits,
            workers: JoinSet::new(),
        }
    }

    /// Start processing jobs from the queue
    pub async fn run(mut self) {
        tracing::info!(
            "Job processor started ({} backend, {} concurrent job(s))",
            self.backend.name(),
            self.config.jobs.max_concurrent
        );

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown_rx.recv() => {
                    tracing::info!("Job processor shutting down");
                    break;
                }
                _ = self.state.job_available() => {}
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }

            while self.workers.try_join_next().is_some() {}
            self.dispatch_ready();
        }

        self.stop_workers().await;
    }

    /// Hand queued jobs to workers while permits are free.
    fn dispatch_ready(&mut self) {
        loop {
            let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() else {
                return;
            };
            let Some(job) = self.state.dequeue_job() else {
                return;
            };

            let worker = Worker {
                state: Arc::clone(&self.state),
                config: Arc::clone(&self.config),
                backend: Arc::clone(&self.backend),
            };
            self.workers.spawn(async move {
                worker.process(job).await;
                drop(permit);
            });
        }
    }

    /// Abort every job a worker holds, then wait for the workers to exit.
    ///
    /// A dequeued job may not have reached `Running` yet; it is off the
    /// queue, so it is aborted too and its worker cancels it on start.
    async fn stop_workers(&mut self) {
        let queued = self.state.get_queue();
        for job in self.state.get_active_jobs() {
            if job.status.is_finished() || queued.contains(&job.id) {
                continue;
            }
            if let Some(signal) = self.state.abort_signal(job.id) {
                tracing::info!("Aborting job {} for shutdown", job.id);
                signal.abort();
            }
        }
        while self.workers.join_next().await.is_some() {}
    }
}

struct Worker {
    state: Arc<AppState>,
    config: Arc<Config>,
    backend: Arc<dyn MediaBackend>,
}

impl Worker {
    async fn process(self, job: Job) {
        let job_id = job.id;
        tracing::info!(
            "Processing job {}: {:?} in {}s segments",
            job_id,
            job.file_path,
            job.segment_secs
        );

        let abort = self.state.abort_signal(job_id).unwrap_or_default();
        if abort.is_aborted() {
            self.state.mark_cancelled(job_id);
            return;
        }

        self.state.start_job(job_id);
        self.state.update_progress(job_id, 0.0, "Probing source");

        let state = Arc::clone(&self.state);
        let profile = self.config.segmenting.profile();
        let executor = SegmentExecutor::new(job.output_dir.clone(), profile)
            .with_abort_signal(abort)
            .with_progress_callback(Box::new(move |event| match event {
                SegmentEvent::Started { range, total } => {
                    if range.index == 1 {
                        state.set_planned(job_id, total as u32);
                    }
                    state.update_progress(
                        job_id,
                        percent(range.index - 1, total),
                        &format!("Encoding segment {}/{}", range.index, total),
                    );
                }
                SegmentEvent::Written { artifact, total } => {
                    state.record_segment(job_id, SegmentArtifact::from_output(job_id, artifact));
                    state.update_progress(
                        job_id,
                        percent(artifact.index, total),
                        &format!("Wrote segment {}/{}", artifact.index, total),
                    );
                }
            }));

        let backend = Arc::clone(&self.backend);
        let path = job.file_path.clone();
        let segment_secs = job.segment_secs;

        let result = tokio::task::spawn_blocking(move || {
            executor.split(backend.as_ref(), &path, segment_secs)
        })
        .await;

        match result {
            Ok(Ok(outcome)) => {
                tracing::info!(
                    "Job {} completed: {} segment(s) in {:?}",
                    job_id,
                    outcome.artifacts.len(),
                    job.output_dir
                );
                self.state.complete_job(job_id);
            }
            Ok(Err(e)) if e.kind() == ErrorKind::Aborted => {
                tracing::info!("Job {} cancelled", job_id);
                self.state.mark_cancelled(job_id);
            }
            Ok(Err(e)) => {
                tracing::error!("Job {} failed: {}", job_id, e);
                self.state.fail_job(job_id, &JobFailure::from(&e));
            }
            Err(e) => {
                tracing::error!("Job {} worker crashed: {}", job_id, e);
                self.state
                    .fail_job(job_id, &JobFailure::internal(format!("worker crashed: {e}")));
            }
        }
    }
}

fn percent(done: u32, total: usize) -> f32 {
    if total == 0 {
        return 0.0;
    }
    (done as f32 / total as f32) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{JobSource, JobStatus};
    use vidsplit_av::segment::fake::FakeBackend;
    use vidsplit_common::JobId;

    fn processor(state: &Arc<AppState>, backend: &FakeBackend) -> JobProcessor {
        let (_shutdown_tx, shutdown_rx) = mpsc::channel(1);
        JobProcessor::new(
            Arc::clone(state),
            Arc::new(Config::default()),
            Arc::new(backend.clone()) as Arc<dyn MediaBackend>,
            shutdown_rx,
        )
    }

    #[tokio::test]
    async fn test_stop_aborts_dispatched_job_before_it_starts() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(None);
        let backend = FakeBackend::new(600.0);
        let mut processor = processor(&state, &backend);

        let id = JobId::new();
        let job = Job::new(
            id,
            dir.path().join("pending.mp4"),
            60,
            dir.path().join("out"),
            JobSource::Api,
        );
        state.queue_job(job).unwrap();

        // The worker task is not polled until stop_workers awaits it.
        processor.dispatch_ready();
        assert!(state.get_queue().is_empty());
        assert_eq!(state.find_job(id).unwrap().status, JobStatus::Queued);

        processor.stop_workers().await;

        assert_eq!(state.find_job(id).unwrap().status, JobStatus::Cancelled);
        assert_eq!(backend.opens(), 0);
    }

    #[tokio::test]
    async fn test_stop_leaves_queued_jobs_alone() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::new(None);
        let backend = FakeBackend::new(60.0);
        let mut processor = processor(&state, &backend);

        let id = JobId::new();
        let job = Job::new(
            id,
            dir.path().join("later.mp4"),
            60,
            dir.path().join("out"),
            JobSource::Api,
        );
        state.queue_job(job).unwrap();

        processor.stop_workers().await;

        assert_eq!(state.get_queue(), vec![id]);
        assert!(!state.abort_signal(id).unwrap().is_aborted());
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0, 3), 0.0);
        assert_eq!(percent(3, 3), 100.0);
        assert_eq!(percent(1, 0), 0.0);
        assert!((percent(1, 3) - 33.333).abs() < 0.01);
    }
}
