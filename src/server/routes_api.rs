use crate::server::AppContext;
use crate::state::{Job, JobError, JobSource, JobStatus};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use vidsplit_av::tools::check_tools;
use vidsplit_common::JobId;

pub fn api_routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .route("/jobs", get(list_jobs))
        .route("/jobs/submit", post(submit_job))
        .route("/jobs/:id", get(get_job).delete(delete_job))
        .route("/jobs/:id/cancel", post(cancel_job))
        .route("/jobs/:id/retry", post(retry_job))
        .route("/queue", get(get_queue))
        .route("/history", get(get_history))
        .route("/tools", get(get_tools))
}

impl From<JobError> for (StatusCode, String) {
    fn from(e: JobError) -> Self {
        let status = match e {
            JobError::NotFound(_) => StatusCode::NOT_FOUND,
            JobError::AlreadyFinished { .. }
            | JobError::NotRetryable { .. }
            | JobError::Duplicate(_) => StatusCode::CONFLICT,
        };
        (status, e.to_string())
    }
}

async fn health(State(ctx): State<AppContext>) -> impl IntoResponse {
    let stats = ctx.state.get_stats();
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "stats": {
            "total_processed": stats.total_processed,
            "success_rate": stats.success_rate()
        }
    }))
}

async fn stats(State(ctx): State<AppContext>) -> impl IntoResponse {
    let stats = ctx.state.get_stats();
    Json(stats)
}

#[derive(Deserialize)]
struct ListJobsQuery {
    status: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

async fn list_jobs(
    State(ctx): State<AppContext>,
    Query(params): Query<ListJobsQuery>,
) -> Result<Json<Vec<Job>>, (StatusCode, String)> {
    let mut jobs = ctx.state.get_active_jobs();

    if let Some(status) = params.status {
        let status: JobStatus = status
            .parse()
            .map_err(|e: String| (StatusCode::BAD_REQUEST, e))?;
        jobs.retain(|j| j.status == status);
    }

    let offset = params.offset.unwrap_or(0);
    let limit = params.limit.unwrap_or(100);
    let jobs: Vec<_> = jobs.into_iter().skip(offset).take(limit).collect();

    Ok(Json(jobs))
}

#[derive(Deserialize)]
struct SubmitJobRequest {
    file_path: String,
    /// Segment length in seconds; the configured default when absent
    duration: Option<i64>,
}

#[derive(Serialize)]
pub struct SubmitJobResponse {
    pub job_id: JobId,
    pub file_path: String,
    pub segment_secs: u32,
    pub status_url: String,
}

async fn submit_job(
    State(ctx): State<AppContext>,
    Json(payload): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<SubmitJobResponse>), (StatusCode, String)> {
    let file_path = payload.file_path.trim();
    if file_path.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "File path cannot be empty".to_string(),
        ));
    }

    let segment_secs = match payload.duration {
        Some(secs) => vidsplit_av::segment::validate_segment_secs(secs)
            .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?,
        None => ctx.config.segmenting.default_segment_secs,
    };

    let path = PathBuf::from(file_path);

    if !path.exists() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("File does not exist: {}", file_path),
        ));
    }

    if !path.is_file() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Path is not a file: {}", file_path),
        ));
    }

    if !vidsplit_common::paths::has_allowed_extension(&path, &ctx.config.storage.allowed_extensions)
    {
        return Err((
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            format!(
                "File type not allowed, expected one of: {}",
                ctx.config.storage.allowed_extensions.join(", ")
            ),
        ));
    }

    let job_id = JobId::new();
    let output_dir = vidsplit_common::paths::job_dir(&ctx.config.storage.segments_dir, job_id);
    let job = Job::new(job_id, path, segment_secs, output_dir, JobSource::Api);

    let job = ctx.state.queue_job(job)?;
    tracing::info!("Submitted job {} for file: {}", job.id, file_path);

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            job_id: job.id,
            file_path: file_path.to_string(),
            segment_secs,
            status_url: status_url(job.id),
        }),
    ))
}

/// Where clients poll a job's status.
pub fn status_url(id: JobId) -> String {
    format!("/api/jobs/{}", id)
}

async fn get_job(
    State(ctx): State<AppContext>,
    Path(id): Path<JobId>,
) -> Result<Json<Job>, StatusCode> {
    ctx.state.find_job(id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

async fn cancel_job(
    State(ctx): State<AppContext>,
    Path(id): Path<JobId>,
) -> Result<Json<Job>, (StatusCode, String)> {
    Ok(Json(ctx.state.cancel_job(id)?))
}

async fn retry_job(
    State(ctx): State<AppContext>,
    Path(id): Path<JobId>,
) -> Result<Json<Job>, (StatusCode, String)> {
    Ok(Json(ctx.state.retry_job(id)?))
}

async fn delete_job(State(ctx): State<AppContext>, Path(id): Path<JobId>) -> impl IntoResponse {
    if ctx.state.delete_job(id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn get_queue(State(ctx): State<AppContext>) -> impl IntoResponse {
    let queue_ids = ctx.state.get_queue();
    let jobs: Vec<_> = queue_ids
        .into_iter()
        .filter_map(|id| ctx.state.get_job(id))
        .collect();
    Json(jobs)
}

#[derive(Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn get_history(
    State(ctx): State<AppContext>,
    Query(params): Query<HistoryQuery>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(100);
    let history = ctx.state.get_history(limit);
    Json(history)
}

async fn get_tools(State(ctx): State<AppContext>) -> impl IntoResponse {
    let tools = ctx.config.tools.clone();

    let result = tokio::task::spawn_blocking(move || {
        check_tools(tools.ffmpeg_path.as_deref(), tools.ffprobe_path.as_deref())
    })
    .await;

    match result {
        Ok(tools) => Json(tools).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
