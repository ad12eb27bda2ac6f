//! Shared helpers for integration tests.
#![allow(dead_code)]

use axum::body::Body;
use http_body_util::BodyExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;
use vidsplit::config::Config;
use vidsplit::processor::JobProcessor;
use vidsplit::server::{create_router, AppContext};
use vidsplit::state::{AppState, Job, JobStatus};
use vidsplit_av::segment::fake::FakeBackend;
use vidsplit_av::MediaBackend;
use vidsplit_common::JobId;

/// Multipart boundary used by [`multipart_body`].
pub const BOUNDARY: &str = "vidsplit-test-boundary";

/// A config whose storage lives in a temporary directory.
pub struct TestEnv {
    pub dir: TempDir,
    pub config: Config,
    pub state: Arc<AppState>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.storage.upload_dir = dir.path().join("uploads");
        config.storage.segments_dir = dir.path().join("segments");
        adjust(&mut config);
        vidsplit::config::ensure_directories(&config).unwrap();

        Self {
            dir,
            config,
            state: AppState::new(None),
        }
    }

    pub fn context(&self) -> AppContext {
        AppContext::new(self.state.clone(), Arc::new(self.config.clone()))
    }

    pub fn router(&self) -> axum::Router {
        create_router(self.context(), None)
    }

    /// Write a placeholder source file (the fake backend never reads it).
    pub fn source_file(&self, name: &str) -> PathBuf {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"not really a video").unwrap();
        path
    }

    /// Run a job processor with `backend` until the returned handle is dropped.
    pub fn spawn_processor(&self, backend: FakeBackend) -> ProcessorHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let processor = JobProcessor::new(
            self.state.clone(),
            Arc::new(self.config.clone()),
            Arc::new(backend) as Arc<dyn MediaBackend>,
            shutdown_rx,
        );
        let handle = tokio::spawn(processor.run());
        ProcessorHandle {
            shutdown_tx,
            handle: Some(handle),
        }
    }

    /// Poll until `id` reaches a final state.
    pub async fn wait_finished(&self, id: JobId) -> Job {
        self.wait_for(id, |job| job.status.is_finished()).await
    }

    /// Poll until `id` satisfies `pred`, failing the test after five seconds.
    pub async fn wait_for(&self, id: JobId, pred: impl Fn(&Job) -> bool) -> Job {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(job) = self.state.find_job(id) {
                if pred(&job) {
                    return job;
                }
            }
            if tokio::time::Instant::now() > deadline {
                panic!(
                    "job {id} did not reach the expected state: {:?}",
                    self.state.find_job(id).map(|j| j.status)
                );
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

pub struct ProcessorHandle {
    shutdown_tx: mpsc::Sender<()>,
    handle: Option<tokio::task::JoinHandle<()>>,
}

impl ProcessorHandle {
    pub async fn shutdown(mut self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Some(handle) = self.handle.take() {
            handle.await.unwrap();
        }
    }
}

impl Drop for ProcessorHandle {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Build a multipart/form-data body from `(name, filename, content)` parts.
pub fn multipart_body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, content) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(filename) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; \
                         filename=\"{filename}\"\r\n"
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            }
            None => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                );
            }
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Content-Type header value matching [`multipart_body`].
pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

/// Helper to get response body as string
pub async fn body_to_string(body: Body) -> String {
    let bytes = body.collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_to_json(body: Body) -> serde_json::Value {
    serde_json::from_str(&body_to_string(body).await).unwrap()
}

/// Names of the non-hidden files in `dir`, sorted.
pub fn list_files(dir: &Path) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();
    names
}

pub fn is_status(job: &Job, status: JobStatus) -> bool {
    job.status == status
}
