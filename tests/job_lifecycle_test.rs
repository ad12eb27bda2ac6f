//! Job lifecycle tests: queue -> processor -> segments on disk.
//!
//! The processor runs against the fake media backend, so these exercise the
//! real executor, state transitions and artifact layout without ffmpeg.

mod common;

use common::{is_status, list_files, TestEnv};
use std::time::Duration;
use vidsplit::state::{AppEvent, Job, JobSource, JobStatus};
use vidsplit_av::segment::fake::{FakeBackend, FakeFailure};
use vidsplit_av::ErrorKind;
use vidsplit_common::paths::job_dir;
use vidsplit_common::JobId;

fn queue(env: &TestEnv, name: &str, segment_secs: u32) -> Job {
    let source = env.source_file(name);
    let id = JobId::new();
    let output_dir = job_dir(&env.config.storage.segments_dir, id);
    env.state
        .queue_job(Job::new(id, source, segment_secs, output_dir, JobSource::Api))
        .unwrap()
}

#[tokio::test]
async fn test_job_completes_with_named_segments() {
    let env = TestEnv::new();
    let backend = FakeBackend::new(150.0);
    let processor = env.spawn_processor(backend.clone());

    let job = queue(&env, "holiday.mov", 60);
    let done = env.wait_finished(job.id).await;

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.progress, 100.0);
    assert_eq!(done.total_segments, Some(3));

    let names: Vec<_> = done.segments.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        ["holiday_part1.mp4", "holiday_part2.mp4", "holiday_part3.mp4"]
    );
    assert_eq!(list_files(&job.output_dir), names);

    let last = done.segments.last().unwrap();
    assert_eq!((last.start, last.end), (120.0, 150.0));
    assert_eq!(
        last.download_url,
        format!("/download/{}/holiday_part3.mp4", job.id)
    );

    assert_eq!(backend.opens(), 1);
    assert_eq!(backend.closes(), 1);

    let stats = env.state.get_stats();
    assert_eq!(stats.successful, 1);
    assert_eq!(stats.segments_written, 3);

    processor.shutdown().await;
}

#[tokio::test]
async fn test_short_video_yields_single_segment() {
    let env = TestEnv::new();
    let processor = env.spawn_processor(FakeBackend::new(30.0));

    let job = queue(&env, "clip.mp4", 60);
    let done = env.wait_finished(job.id).await;

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.segments.len(), 1);
    assert_eq!(done.segments[0].name, "clip_part1.mp4");
    assert_eq!((done.segments[0].start, done.segments[0].end), (0.0, 30.0));

    processor.shutdown().await;
}

#[tokio::test]
async fn test_failure_names_segment_and_keeps_earlier_output() {
    let env = TestEnv::new();
    let backend = FakeBackend::new(150.0).fail_on(2, FakeFailure::Encoding);
    let processor = env.spawn_processor(backend.clone());

    let job = queue(&env, "name.mp4", 60);
    let done = env.wait_finished(job.id).await;

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.failed_segment, Some(2));
    assert_eq!(done.error_kind, Some(ErrorKind::EncodingFailure));
    assert!(done.error.as_deref().unwrap().contains("segment 2"));

    // Segment 1 stays downloadable, nothing after the failure is produced.
    assert_eq!(done.segments.len(), 1);
    assert_eq!(list_files(&job.output_dir), ["name_part1.mp4"]);
    assert_eq!(backend.extracted().len(), 2);

    assert_eq!(backend.opens(), 1);
    assert_eq!(backend.closes(), 1);
    assert_eq!(env.state.get_stats().failed, 1);

    processor.shutdown().await;
}

#[tokio::test]
async fn test_open_failure_fails_job_without_segments() {
    let env = TestEnv::new();
    let backend = FakeBackend::new(150.0).fail_open();
    let processor = env.spawn_processor(backend.clone());

    let job = queue(&env, "gone.mp4", 60);
    let done = env.wait_finished(job.id).await;

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.error_kind, Some(ErrorKind::IoFailure));
    assert_eq!(done.failed_segment, None);
    assert!(list_files(&job.output_dir).is_empty());
    assert_eq!(backend.closes(), 0);

    processor.shutdown().await;
}

#[tokio::test]
async fn test_zero_length_media_is_invalid_argument() {
    let env = TestEnv::new();
    let backend = FakeBackend::new(0.0);
    let processor = env.spawn_processor(backend.clone());

    let job = queue(&env, "empty.mp4", 60);
    let done = env.wait_finished(job.id).await;

    assert_eq!(done.status, JobStatus::Failed);
    assert_eq!(done.error_kind, Some(ErrorKind::InvalidArgument));
    assert!(done.segments.is_empty());
    assert_eq!(backend.closes(), 1);

    processor.shutdown().await;
}

#[tokio::test]
async fn test_cancel_running_job() {
    let env = TestEnv::new();
    let backend = FakeBackend::new(600.0).with_delay(Duration::from_millis(200));
    let processor = env.spawn_processor(backend.clone());

    let job = queue(&env, "long.mp4", 60);
    env.wait_for(job.id, |j| j.total_segments.is_some()).await;

    let response = env.state.cancel_job(job.id).unwrap();
    assert_eq!(response.status, JobStatus::Running);

    let done = env.wait_finished(job.id).await;
    assert_eq!(done.status, JobStatus::Cancelled);
    assert_eq!(done.error_kind, Some(ErrorKind::Aborted));
    assert!(done.segments.len() < 10);
    assert_eq!(backend.closes(), 1);
    assert_eq!(env.state.get_stats().cancelled, 1);

    processor.shutdown().await;
}

#[tokio::test]
async fn test_jobs_run_one_at_a_time_by_default() {
    let env = TestEnv::new();
    let backend = FakeBackend::new(60.0).with_delay(Duration::from_millis(100));

    let first = queue(&env, "a.mp4", 60);
    let second = queue(&env, "b.mp4", 60);
    let processor = env.spawn_processor(backend.clone());

    env.wait_for(first.id, |j| is_status(j, JobStatus::Running)).await;
    assert_eq!(
        env.state.find_job(second.id).unwrap().status,
        JobStatus::Queued
    );

    assert_eq!(env.wait_finished(first.id).await.status, JobStatus::Completed);
    assert_eq!(env.wait_finished(second.id).await.status, JobStatus::Completed);
    assert_eq!(backend.opens(), 2);
    assert_eq!(backend.closes(), 2);

    processor.shutdown().await;
}

#[tokio::test]
async fn test_concurrent_jobs_keep_separate_outputs() {
    let env = TestEnv::with_config(|c| c.jobs.max_concurrent = 2);
    let backend = FakeBackend::new(90.0).with_delay(Duration::from_millis(50));
    let processor = env.spawn_processor(backend.clone());

    // Same source name twice: per-job directories keep the artifacts apart.
    let first = queue(&env, "same.mp4", 60);
    let second_source = env.dir.path().join("other");
    std::fs::create_dir_all(&second_source).unwrap();
    let second_path = second_source.join("same.mp4");
    std::fs::write(&second_path, b"x").unwrap();
    let id = JobId::new();
    let second = env
        .state
        .queue_job(Job::new(
            id,
            second_path,
            60,
            job_dir(&env.config.storage.segments_dir, id),
            JobSource::Api,
        ))
        .unwrap();

    let a = env.wait_finished(first.id).await;
    let b = env.wait_finished(second.id).await;
    assert_eq!(a.status, JobStatus::Completed);
    assert_eq!(b.status, JobStatus::Completed);
    assert_ne!(a.output_dir, b.output_dir);
    assert_eq!(list_files(&a.output_dir), ["same_part1.mp4", "same_part2.mp4"]);
    assert_eq!(list_files(&b.output_dir), ["same_part1.mp4", "same_part2.mp4"]);

    processor.shutdown().await;
}

#[tokio::test]
async fn test_retry_after_failure_reuses_job() {
    let env = TestEnv::new();
    let failing = env.spawn_processor(FakeBackend::new(120.0).fail_on(1, FakeFailure::Io));

    let job = queue(&env, "retry.mp4", 60);
    assert_eq!(env.wait_finished(job.id).await.status, JobStatus::Failed);
    failing.shutdown().await;

    let working = env.spawn_processor(FakeBackend::new(120.0));
    env.state.retry_job(job.id).unwrap();
    let done = env.wait_finished(job.id).await;

    assert_eq!(done.id, job.id);
    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.segments.len(), 2);
    assert!(done.error.is_none());

    working.shutdown().await;
}

#[tokio::test]
async fn test_events_follow_job_progress() {
    let env = TestEnv::new();
    let mut rx = env.state.subscribe();
    let processor = env.spawn_processor(FakeBackend::new(100.0));

    let job = queue(&env, "events.mp4", 60);

    let mut kinds = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for events")
            .unwrap();
        let kind = match event {
            AppEvent::JobQueued { .. } => "queued",
            AppEvent::JobStarted { .. } => "started",
            AppEvent::JobPlanned { total_segments, .. } => {
                assert_eq!(total_segments, 2);
                "planned"
            }
            AppEvent::SegmentWritten { .. } => "segment",
            AppEvent::JobCompleted { ref job } => {
                assert_eq!(job.segments.len(), 2);
                "completed"
            }
            AppEvent::JobProgress { .. } => continue,
            other => panic!("unexpected event {other:?}"),
        };
        kinds.push(kind);
        if kind == "completed" {
            break;
        }
    }
    assert_eq!(env.state.find_job(job.id).unwrap().status, JobStatus::Completed);

    assert_eq!(
        kinds,
        ["queued", "started", "planned", "segment", "segment", "completed"]
    );

    processor.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_aborts_running_job() {
    let env = TestEnv::new();
    let backend = FakeBackend::new(3600.0).with_delay(Duration::from_millis(200));
    let processor = env.spawn_processor(backend.clone());

    let job = queue(&env, "endless.mp4", 60);
    env.wait_for(job.id, |j| j.total_segments.is_some()).await;

    processor.shutdown().await;

    let done = env.state.find_job(job.id).unwrap();
    assert_eq!(done.status, JobStatus::Cancelled);
    assert_eq!(backend.closes(), 1);
}
