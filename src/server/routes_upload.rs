//! Multipart upload endpoint.
//!
//! `POST /upload` takes a `file` field and an optional `duration` field
//! (segment length in whole seconds). The file is streamed to disk under
//! `upload_dir/<job_id>/` and a split job is queued for it.

use crate::config::Config;
use crate::server::routes_api::status_url;
use crate::server::AppContext;
use crate::state::{Job, JobError, JobSource};
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use vidsplit_av::SegmentRequest;
use vidsplit_common::paths::{has_allowed_extension, job_dir, sanitize_filename};
use vidsplit_common::JobId;

/// Allowance for multipart framing and the small form fields.
const FORM_OVERHEAD_BYTES: u64 = 1024 * 1024;

pub fn upload_routes(config: &Config) -> Router<AppContext> {
    let limit = config
        .storage
        .max_upload_bytes()
        .saturating_add(FORM_OVERHEAD_BYTES);
    Router::new()
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(
            usize::try_from(limit).unwrap_or(usize::MAX),
        ))
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No file part in the request")]
    MissingFile,

    #[error("No file selected")]
    EmptyFilename,

    #[error("Filename {0:?} has no usable characters")]
    InvalidFilename(String),

    #[error("File type not allowed, expected one of: {0}")]
    UnsupportedType(String),

    #[error("File exceeds the {0} MB upload limit")]
    TooLarge(u64),

    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Failed to store upload: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Queue(#[from] JobError),
}

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = match &self {
            UploadError::MissingFile
            | UploadError::EmptyFilename
            | UploadError::InvalidFilename(_)
            | UploadError::InvalidDuration(_) => StatusCode::BAD_REQUEST,
            UploadError::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            UploadError::TooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            UploadError::Multipart(e) => e.status(),
            UploadError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            UploadError::Queue(_) => StatusCode::CONFLICT,
        };
        if status.is_server_error() {
            tracing::error!("Upload failed: {}", self);
        } else {
            tracing::debug!("Upload rejected: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub job_id: JobId,
    pub file_name: String,
    pub segment_secs: u32,
    pub status_url: String,
}

/// Removes a job's upload directory unless the upload was accepted.
struct UploadDirGuard {
    dir: PathBuf,
    keep: bool,
}

impl Drop for UploadDirGuard {
    fn drop(&mut self) {
        if !self.keep {
            if let Err(e) = std::fs::remove_dir_all(&self.dir) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to clean up {:?}: {}", self.dir, e);
                }
            }
        }
    }
}

async fn upload(
    State(ctx): State<AppContext>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>), UploadError> {
    let storage = &ctx.config.storage;
    let job_id = JobId::new();
    let mut guard = UploadDirGuard {
        dir: job_dir(&storage.upload_dir, job_id),
        keep: false,
    };

    let mut saved: Option<PathBuf> = None;
    let mut duration: Option<String> = None;

    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let raw_name = field.file_name().unwrap_or_default().to_string();
                let file_name = validate_file_name(&raw_name, &storage.allowed_extensions)?;

                tokio::fs::create_dir_all(&guard.dir).await?;
                let dest = guard.dir.join(&file_name);
                save_field(&mut field, &dest, storage.max_upload_bytes(), storage.max_upload_mb)
                    .await?;
                saved = Some(dest);
            }
            Some("duration") => {
                duration = Some(field.text().await?);
            }
            other => {
                tracing::debug!("Ignoring form field {:?}", other);
            }
        }
    }

    let path = saved.ok_or(UploadError::MissingFile)?;
    let segment_secs = parse_duration(
        duration.as_deref(),
        ctx.config.segmenting.default_segment_secs,
    )?;

    let output_dir = job_dir(&storage.segments_dir, job_id);
    let job = Job::new(job_id, path, segment_secs, output_dir, JobSource::Upload);
    let job = ctx.state.queue_job(job)?;
    guard.keep = true;

    tracing::info!(
        "Accepted upload {} as job {} ({}s segments)",
        job.file_name,
        job.id,
        segment_secs
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadResponse {
            job_id: job.id,
            file_name: job.file_name,
            segment_secs,
            status_url: status_url(job_id),
        }),
    ))
}

/// Check the client-supplied name and return the name to store it under.
fn validate_file_name(raw: &str, allowed: &[String]) -> Result<String, UploadError> {
    if raw.trim().is_empty() {
        return Err(UploadError::EmptyFilename);
    }
    // Extension is judged on the client's name so sanitising cannot turn
    // a rejected type into an accepted one.
    if !has_allowed_extension(Path::new(raw), allowed) {
        return Err(UploadError::UnsupportedType(allowed.join(", ")));
    }
    let name = sanitize_filename(raw).ok_or_else(|| UploadError::InvalidFilename(raw.to_string()))?;
    if !has_allowed_extension(Path::new(&name), allowed) {
        return Err(UploadError::InvalidFilename(raw.to_string()));
    }
    Ok(name)
}

/// Parse the optional `duration` form field.
fn parse_duration(raw: Option<&str>, default_secs: u32) -> Result<u32, UploadError> {
    let raw = match raw.map(str::trim) {
        None | Some("") => return Ok(default_secs),
        Some(raw) => raw,
    };
    SegmentRequest::parse(raw)
        .map(|request| request.segment_secs())
        .map_err(|e| UploadError::InvalidDuration(e.to_string()))
}

/// Stream one multipart field to `dest` through a temporary file.
async fn save_field(
    field: &mut axum::extract::multipart::Field<'_>,
    dest: &Path,
    max_bytes: u64,
    max_mb: u64,
) -> Result<u64, UploadError> {
    let dir = dest.parent().unwrap_or_else(|| Path::new("."));
    let (file, temp_path) = tempfile::Builder::new()
        .prefix(".upload.")
        .tempfile_in(dir)?
        .into_parts();
    let mut file = tokio::fs::File::from_std(file);

    let mut written: u64 = 0;
    while let Some(chunk) = field.chunk().await? {
        written += chunk.len() as u64;
        if written > max_bytes {
            return Err(UploadError::TooLarge(max_mb));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    temp_path.persist(dest).map_err(|e| UploadError::Io(e.error))?;
    tracing::debug!("Stored {} bytes at {:?}", written, dest);
    Ok(written)
}
