mod types;

pub use types::*;

use anyhow::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use vidsplit_av::AbortSignal;
use vidsplit_common::JobId;

const DEFAULT_HISTORY_SIZE: usize = 1000;

/// Application-wide event for SSE broadcasting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AppEvent {
    /// A job has been queued for processing.
    JobQueued {
        #[serde(flatten)]
        job: Job,
    },
    /// A worker has picked the job up.
    JobStarted { id: JobId },
    /// The source has been probed and split into `total_segments` ranges.
    JobPlanned { id: JobId, total_segments: u32 },
    /// A job's progress has been updated.
    JobProgress { id: JobId, progress: f32, step: String },
    /// One segment has been written and can be downloaded.
    SegmentWritten { id: JobId, segment: SegmentArtifact },
    /// A job has completed successfully.
    JobCompleted {
        #[serde(flatten)]
        job: Job,
    },
    /// A job has failed.
    JobFailed {
        id: JobId,
        error: String,
        failed_segment: Option<u32>,
    },
    /// A job was cancelled before finishing.
    JobCancelled { id: JobId },
}

impl AppEvent {
    /// Job the event is about.
    pub fn job_id(&self) -> JobId {
        match self {
            AppEvent::JobQueued { job } | AppEvent::JobCompleted { job } => job.id,
            AppEvent::JobStarted { id }
            | AppEvent::JobPlanned { id, .. }
            | AppEvent::JobProgress { id, .. }
            | AppEvent::SegmentWritten { id, .. }
            | AppEvent::JobFailed { id, .. }
            | AppEvent::JobCancelled { id } => *id,
        }
    }

    /// SSE event name, same as the serialized `event_type`.
    pub fn name(&self) -> &'static str {
        match self {
            AppEvent::JobQueued { .. } => "job_queued",
            AppEvent::JobStarted { .. } => "job_started",
            AppEvent::JobPlanned { .. } => "job_planned",
            AppEvent::JobProgress { .. } => "job_progress",
            AppEvent::SegmentWritten { .. } => "segment_written",
            AppEvent::JobCompleted { .. } => "job_completed",
            AppEvent::JobFailed { .. } => "job_failed",
            AppEvent::JobCancelled { .. } => "job_cancelled",
        }
    }
}

/// Why a job operation was refused.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("job {0} not found")]
    NotFound(JobId),

    #[error("job {id} is already {status:?}")]
    AlreadyFinished { id: JobId, status: JobStatus },

    #[error("job {id} cannot be retried while {status:?}")]
    NotRetryable { id: JobId, status: JobStatus },

    #[error("file already being processed: {0:?}")]
    Duplicate(PathBuf),
}

pub struct AppState {
    jobs: RwLock<HashMap<JobId, Job>>,
    queue: RwLock<VecDeque<JobId>>,
    history: RwLock<VecDeque<Job>>,
    stats: RwLock<JobStats>,
    seen_files: RwLock<HashSet<PathBuf>>,
    aborts: RwLock<HashMap<JobId, AbortSignal>>,
    history_size: usize,
    persistence_path: Option<PathBuf>,
    event_tx: broadcast::Sender<AppEvent>,
    queued: Notify,
}

impl AppState {
    pub fn new(persistence_path: Option<PathBuf>) -> Arc<Self> {
        Self::with_history_size(persistence_path, DEFAULT_HISTORY_SIZE)
    }

    pub fn with_history_size(persistence_path: Option<PathBuf>, history_size: usize) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(256);

        let state = Arc::new(Self {
            jobs: RwLock::new(HashMap::new()),
            queue: RwLock::new(VecDeque::new()),
            history: RwLock::new(VecDeque::new()),
            stats: RwLock::new(JobStats::default()),
            seen_files: RwLock::new(HashSet::new()),
            aborts: RwLock::new(HashMap::new()),
            history_size: history_size.max(1),
            persistence_path,
            event_tx,
            queued: Notify::new(),
        });

        if let Some(ref path) = state.persistence_path {
            if let Err(e) = state.load_from_file(path) {
                tracing::warn!("Failed to load persisted state: {}", e);
            }
        }

        state
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AppEvent> {
        self.event_tx.subscribe()
    }

    /// Broadcast an event to all subscribers.
    pub fn broadcast(&self, event: AppEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::debug!("No subscribers for event");
        }
    }

    /// Wait until a job is queued (or one was queued since the last wait).
    pub async fn job_available(&self) {
        self.queued.notified().await;
    }

    /// Queue a new job for processing
    pub fn queue_job(&self, job: Job) -> std::result::Result<Job, JobError> {
        {
            let mut seen = self.seen_files.write();
            if !seen.insert(job.file_path.clone()) {
                return Err(JobError::Duplicate(job.file_path));
            }
        }

        self.enqueue(job.clone());
        self.broadcast(AppEvent::JobQueued { job: job.clone() });
        self.persist();

        Ok(job)
    }

    fn enqueue(&self, job: Job) {
        let id = job.id;
        self.aborts.write().insert(id, AbortSignal::new());
        self.jobs.write().insert(id, job);
        self.queue.write().push_back(id);
        self.queued.notify_one();
    }

    /// Get the next job from the queue
    pub fn dequeue_job(&self) -> Option<Job> {
        let id = {
            let mut queue = self.queue.write();
            queue.pop_front()?
        };

        let jobs = self.jobs.read();
        jobs.get(&id).cloned()
    }

    /// Abort signal shared with the worker running `id`.
    pub fn abort_signal(&self, id: JobId) -> Option<AbortSignal> {
        self.aborts.read().get(&id).cloned()
    }

    /// Mark a job as started
    pub fn start_job(&self, id: JobId) {
        let mut jobs = self.jobs.write();
        if let Some(job) = jobs.get_mut(&id) {
            job.start();
            self.broadcast(AppEvent::JobStarted { id });
        }
        drop(jobs);
        self.persist();
    }

    /// Record how many segments a running job will produce
    pub fn set_planned(&self, id: JobId, total_segments: u32) {
        let mut jobs = self.jobs.write();
        if let Some(job) = jobs.get_mut(&id) {
            job.total_segments = Some(total_segments);
            self.broadcast(AppEvent::JobPlanned { id, total_segments });
        }
    }

    /// Update job progress
    pub fn update_progress(&self, id: JobId, progress: f32, step: &str) {
        let mut jobs = self.jobs.write();
        if let Some(job) = jobs.get_mut(&id) {
            job.update_progress(progress, step);
            self.broadcast(AppEvent::JobProgress {
                id,
                progress,
                step: step.to_string(),
            });
        }
    }

    /// Record a written segment on an active job
    pub fn record_segment(&self, id: JobId, segment: SegmentArtifact) {
        let mut jobs = self.jobs.write();
        if let Some(job) = jobs.get_mut(&id) {
            job.add_segment(segment.clone());
            self.broadcast(AppEvent::SegmentWritten { id, segment });
        }
    }

    /// Mark a job as completed
    pub fn complete_job(&self, id: JobId) {
        let Some(job) = self.finish(id, Job::complete) else {
            return;
        };

        self.stats
            .write()
            .record_success(job.segments.len() as u64, job.bytes_written());

        self.broadcast(AppEvent::JobCompleted { job });
        self.persist();
    }

    /// Mark a job as failed
    pub fn fail_job(&self, id: JobId, failure: &JobFailure) {
        let Some(job) = self.finish(id, |job| job.fail(failure)) else {
            return;
        };

        self.stats.write().record_failure();

        self.broadcast(AppEvent::JobFailed {
            id,
            error: failure.message.clone(),
            failed_segment: job.failed_segment,
        });
        self.persist();
    }

    /// Mark a job as cancelled once its worker has stopped
    pub fn mark_cancelled(&self, id: JobId) {
        if self.finish(id, Job::cancel).is_none() {
            return;
        }

        self.stats.write().record_cancelled();

        self.broadcast(AppEvent::JobCancelled { id });
        self.persist();
    }

    /// Ask a job to stop.
    ///
    /// A queued job is cancelled immediately. A running job has its abort
    /// signal raised and is marked cancelled by its worker once the current
    /// segment has been interrupted.
    pub fn cancel_job(&self, id: JobId) -> std::result::Result<Job, JobError> {
        let status = match self.get_job(id) {
            Some(job) => job.status,
            None => {
                return match self.find_in_history(id) {
                    Some(job) => Err(JobError::AlreadyFinished {
                        id,
                        status: job.status,
                    }),
                    None => Err(JobError::NotFound(id)),
                };
            }
        };

        if let Some(signal) = self.abort_signal(id) {
            signal.abort();
        }

        if status == JobStatus::Queued {
            let removed = {
                let mut queue = self.queue.write();
                let before = queue.len();
                queue.retain(|q| *q != id);
                queue.len() < before
            };
            if removed {
                self.mark_cancelled(id);
                return self.find_in_history(id).ok_or(JobError::NotFound(id));
            }
        }

        tracing::info!("Cancellation requested for job {}", id);
        self.get_job(id)
            .or_else(|| self.find_in_history(id))
            .ok_or(JobError::NotFound(id))
    }

    /// Move an active job to history after applying `finish`.
    fn finish(&self, id: JobId, finish: impl FnOnce(&mut Job)) -> Option<Job> {
        let job = {
            let mut jobs = self.jobs.write();
            let mut job = jobs.remove(&id)?;
            finish(&mut job);
            job
        };

        self.seen_files.write().remove(&job.file_path);
        self.aborts.write().remove(&id);
        self.add_to_history(job.clone());

        Some(job)
    }

    fn add_to_history(&self, job: Job) {
        let mut history = self.history.write();
        history.push_front(job);
        while history.len() > self.history_size {
            history.pop_back();
        }
    }

    fn find_in_history(&self, id: JobId) -> Option<Job> {
        let history = self.history.read();
        history.iter().find(|j| j.id == id).cloned()
    }

    /// Get an active job by ID
    pub fn get_job(&self, id: JobId) -> Option<Job> {
        let jobs = self.jobs.read();
        jobs.get(&id).cloned()
    }

    /// Get a job by ID, whether active or finished
    pub fn find_job(&self, id: JobId) -> Option<Job> {
        self.get_job(id).or_else(|| self.find_in_history(id))
    }

    /// Get all active jobs, oldest first
    pub fn get_active_jobs(&self) -> Vec<Job> {
        let jobs = self.jobs.read();
        let mut jobs: Vec<Job> = jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs
    }

    /// Get queued job IDs
    pub fn get_queue(&self) -> Vec<JobId> {
        let queue = self.queue.read();
        queue.iter().cloned().collect()
    }

    /// Get job history, newest first
    pub fn get_history(&self, limit: usize) -> Vec<Job> {
        let history = self.history.read();
        history.iter().take(limit).cloned().collect()
    }

    /// Get stats
    pub fn get_stats(&self) -> JobStats {
        let stats = self.stats.read();
        stats.clone()
    }

    /// Re-queue a failed or cancelled job under the same ID.
    ///
    /// The job keeps its source file and output directory; segments from the
    /// earlier attempt are replaced as they are rewritten.
    pub fn retry_job(&self, id: JobId) -> std::result::Result<Job, JobError> {
        if let Some(job) = self.get_job(id) {
            return Err(JobError::NotRetryable {
                id,
                status: job.status,
            });
        }

        let mut job = self.find_in_history(id).ok_or(JobError::NotFound(id))?;
        if !matches!(job.status, JobStatus::Failed | JobStatus::Cancelled) {
            return Err(JobError::NotRetryable {
                id,
                status: job.status,
            });
        }

        {
            let mut seen = self.seen_files.write();
            if !seen.insert(job.file_path.clone()) {
                return Err(JobError::Duplicate(job.file_path));
            }
        }

        self.history.write().retain(|j| j.id != id);
        job.reset();
        self.enqueue(job.clone());
        self.broadcast(AppEvent::JobQueued { job: job.clone() });
        self.persist();

        Ok(job)
    }

    /// Delete a job from history
    pub fn delete_job(&self, id: JobId) -> bool {
        let mut history = self.history.write();
        let len_before = history.len();
        history.retain(|j| j.id != id);
        let deleted = history.len() < len_before;
        drop(history);

        if deleted {
            self.persist();
        }
        deleted
    }

    fn persist(&self) {
        if let Some(ref path) = self.persistence_path {
            if let Err(e) = self.save_to_file(path) {
                tracing::error!("Failed to persist state: {}", e);
            }
        }
    }

    fn save_to_file(&self, path: &Path) -> Result<()> {
        #[derive(Serialize)]
        struct PersistedState {
            history: Vec<Job>,
            stats: JobStats,
        }

        let state = PersistedState {
            history: self.get_history(self.history_size),
            stats: self.get_stats(),
        };

        let json = serde_json::to_string_pretty(&state)?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(json.as_bytes())?;
        file.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    fn load_from_file(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }

        #[derive(Deserialize)]
        struct PersistedState {
            history: Vec<Job>,
            stats: JobStats,
        }

        let content = std::fs::read_to_string(path)?;
        let state: PersistedState = serde_json::from_str(&content)?;

        {
            let mut history = self.history.write();
            *history = VecDeque::from(state.history);
            history.truncate(self.history_size);
        }

        {
            let mut stats = self.stats.write();
            *stats = state.stats;
        }

        Ok(())
    }
}
