//! Segment download: `GET /download/:job_id/:filename`.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use percent_encoding::utf8_percent_encode;
use std::path::PathBuf;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use vidsplit_common::paths::{is_plain_file_name, job_dir};
use vidsplit_common::JobId;

use crate::server::AppContext;
use crate::state::UNRESERVED;

pub fn download_routes() -> Router<AppContext> {
    Router::new().route("/download/:job_id/:filename", get(download_segment))
}

/// Serve a produced segment as an attachment.
async fn download_segment(
    State(ctx): State<AppContext>,
    Path((job_id, filename)): Path<(String, String)>,
) -> Result<Response, StatusCode> {
    if !is_plain_file_name(&filename) {
        return Err(StatusCode::BAD_REQUEST);
    }
    // In-progress temporaries are dot-files; never expose them.
    if filename.starts_with('.') {
        return Err(StatusCode::NOT_FOUND);
    }
    let job_id: JobId = job_id.parse().map_err(|_| StatusCode::NOT_FOUND)?;

    let path = resolve_segment(&ctx, job_id, &filename).ok_or(StatusCode::NOT_FOUND)?;

    let metadata = tokio::fs::metadata(&path)
        .await
        .map_err(|_| StatusCode::NOT_FOUND)?;
    if !metadata.is_file() {
        return Err(StatusCode::NOT_FOUND);
    }

    let file = File::open(&path).await.map_err(|_| StatusCode::NOT_FOUND)?;
    let body = Body::from_stream(ReaderStream::new(file));

    tracing::debug!("Serving {:?} for job {}", path, job_id);

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type(&filename))
        .header(header::CONTENT_LENGTH, metadata.len().to_string())
        .header(header::CONTENT_DISPOSITION, content_disposition(&filename))
        .body(body)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Locate a segment through the job record, or by convention when the job
/// is no longer tracked.
fn resolve_segment(ctx: &AppContext, job_id: JobId, filename: &str) -> Option<PathBuf> {
    match ctx.state.find_job(job_id) {
        Some(job) => job
            .segments
            .iter()
            .find(|s| s.name == filename)
            .map(|s| s.path.clone()),
        None => Some(job_dir(&ctx.config.storage.segments_dir, job_id).join(filename)),
    }
}

/// `attachment` disposition with an ASCII fallback name and the exact name
/// in RFC 5987 form.
fn content_disposition(filename: &str) -> String {
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        utf8_percent_encode(filename, UNRESERVED)
    )
}

fn content_type(filename: &str) -> &'static str {
    let ext = std::path::Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());
    match ext.as_deref() {
        Some("mp4") | Some("m4v") => "video/mp4",
        Some("mkv") => "video/x-matroska",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("ts") => "video/mp2t",
        _ => "application/octet-stream",
    }
}
