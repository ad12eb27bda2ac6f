//! Multipart upload endpoint tests.

mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
};
use common::{body_to_json, list_files, multipart_body, multipart_content_type, TestEnv};
use tower::ServiceExt;
use vidsplit::state::{JobSource, JobStatus};
use vidsplit_common::JobId;

fn upload_request(body: Vec<u8>) -> Request<Body> {
    Request::post("/upload")
        .header(header::CONTENT_TYPE, multipart_content_type())
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn test_upload_queues_job_and_stores_file() {
    let env = TestEnv::new();
    let body = multipart_body(&[
        ("file", Some("My Holiday.mp4"), b"fake video bytes"),
        ("duration", None, b"15"),
    ]);

    let response = env.router().oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["file_name"], "My_Holiday.mp4");
    assert_eq!(json["segment_secs"], 15);
    let job_id: JobId = json["job_id"].as_str().unwrap().parse().unwrap();
    assert_eq!(json["status_url"], format!("/api/jobs/{job_id}"));

    let upload_dir = env.config.storage.upload_dir.join(job_id.to_string());
    assert_eq!(list_files(&upload_dir), ["My_Holiday.mp4"]);
    assert_eq!(
        std::fs::read(upload_dir.join("My_Holiday.mp4")).unwrap(),
        b"fake video bytes"
    );

    let job = env.state.get_job(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.source, JobSource::Upload);
    assert_eq!(
        job.output_dir,
        env.config.storage.segments_dir.join(job_id.to_string())
    );
}

#[tokio::test]
async fn test_upload_uses_default_duration() {
    let env = TestEnv::new();
    let body = multipart_body(&[("file", Some("clip.mkv"), b"data")]);

    let response = env.router().oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["segment_secs"], 60);
}

#[tokio::test]
async fn test_upload_default_duration_follows_config() {
    let env = TestEnv::with_config(|c| c.segmenting.default_segment_secs = 20);
    let body = multipart_body(&[
        ("file", Some("clip.mov"), b"data"),
        ("duration", None, b""),
    ]);

    let response = env.router().oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(body_to_json(response.into_body()).await["segment_secs"], 20);
}

#[tokio::test]
async fn test_upload_extension_is_case_insensitive() {
    let env = TestEnv::new();
    let body = multipart_body(&[("file", Some("SHOUTING.AVI"), b"data")]);

    let response = env.router().oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_upload_without_file_part() {
    let env = TestEnv::new();
    let body = multipart_body(&[("duration", None, b"30")]);

    let response = env.router().oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_to_json(response.into_body()).await;
    assert!(json["error"].as_str().unwrap().contains("No file part"));
    assert!(env.state.get_queue().is_empty());
}

#[tokio::test]
async fn test_upload_with_empty_filename() {
    let env = TestEnv::new();
    let body = multipart_body(&[("file", Some(""), b"data")]);

    let response = env.router().oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(env.state.get_queue().is_empty());
}

#[tokio::test]
async fn test_upload_rejects_disallowed_extension() {
    let env = TestEnv::new();
    let body = multipart_body(&[("file", Some("payload.exe"), b"MZ")]);

    let response = env.router().oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert!(list_files(&env.config.storage.upload_dir).is_empty());
    assert!(env.state.get_queue().is_empty());
}

#[tokio::test]
async fn test_upload_rejects_bad_duration_and_cleans_up() {
    let env = TestEnv::new();

    for duration in [&b"0"[..], b"-3", b"ten", b"2.5"] {
        let body = multipart_body(&[
            ("file", Some("clip.mp4"), b"data"),
            ("duration", None, duration),
        ]);

        let response = env.router().oneshot(upload_request(body)).await.unwrap();

        assert_eq!(
            response.status(),
            StatusCode::BAD_REQUEST,
            "duration {:?}",
            String::from_utf8_lossy(duration)
        );
    }

    // Nothing saved for rejected uploads.
    assert!(list_files(&env.config.storage.upload_dir).is_empty());
    assert!(env.state.get_queue().is_empty());
}

#[tokio::test]
async fn test_upload_over_size_limit() {
    let env = TestEnv::with_config(|c| c.storage.max_upload_mb = 1);
    let content = vec![0u8; 1024 * 1024 + 1];
    let body = multipart_body(&[("file", Some("big.mp4"), &content)]);

    let response = env.router().oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert!(list_files(&env.config.storage.upload_dir).is_empty());
}

#[tokio::test]
async fn test_upload_at_size_limit_is_accepted() {
    let env = TestEnv::with_config(|c| c.storage.max_upload_mb = 1);
    let content = vec![0u8; 1024 * 1024];
    let body = multipart_body(&[("file", Some("exact.mp4"), &content)]);

    let response = env.router().oneshot(upload_request(body)).await.unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn test_uploads_of_same_name_do_not_collide() {
    let env = TestEnv::new();

    let mut ids = Vec::new();
    for content in [&b"first"[..], b"second"] {
        let body = multipart_body(&[("file", Some("same.mp4"), content)]);
        let response = env.router().oneshot(upload_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let json = body_to_json(response.into_body()).await;
        ids.push(json["job_id"].as_str().unwrap().to_string());
    }

    assert_ne!(ids[0], ids[1]);
    let upload_dir = &env.config.storage.upload_dir;
    assert_eq!(
        std::fs::read(upload_dir.join(&ids[0]).join("same.mp4")).unwrap(),
        b"first"
    );
    assert_eq!(
        std::fs::read(upload_dir.join(&ids[1]).join("same.mp4")).unwrap(),
        b"second"
    );
    assert_eq!(env.state.get_queue().len(), 2);
}
