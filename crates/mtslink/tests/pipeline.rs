mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::StatusCode;
use common::MockServer;
use mtslink_engine::{
    AssemblyJob, CompileError, Compiler, DownloaderConfig, Error, Orchestrator, PipelineConfig,
    PipelineState, RecordingRequest, SegmentFailurePolicy,
};
use parking_lot::Mutex;
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// Writes a marker output and remembers every job it was given.
#[derive(Debug, Default)]
struct RecordingCompiler {
    jobs: Mutex<Vec<AssemblyJob>>,
}

#[async_trait]
impl Compiler for RecordingCompiler {
    async fn compile(
        &self,
        job: &AssemblyJob,
        _token: &CancellationToken,
    ) -> Result<(), CompileError> {
        tokio::fs::write(&job.output_path, b"merged")
            .await
            .map_err(|e| CompileError::io("writing", &job.output_path, e))?;
        self.jobs.lock().push(job.clone());
        Ok(())
    }
}

fn orchestrator(
    server: &MockServer,
    output_root: &std::path::Path,
    compiler: Arc<RecordingCompiler>,
) -> Orchestrator {
    orchestrator_with(server, PipelineConfig::default().with_output_root(output_root), compiler)
}

fn orchestrator_with(
    server: &MockServer,
    config: PipelineConfig,
    compiler: Arc<RecordingCompiler>,
) -> Orchestrator {
    let downloader = DownloaderConfig::default().with_base_url(&server.base_url);
    Orchestrator::new(downloader, config)
        .unwrap()
        .with_compiler(compiler)
}

fn file_names(paths: &[std::path::PathBuf]) -> Vec<String> {
    paths
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

fn seed_recording(server: &MockServer) {
    server.set_manifest_json(json!({
        "name": "Q1 Review",
        "eventLogs": [
            { "data": { "url": server.media_url("v1.mp4"), "duration": 10.0 } },
            { "data": { "url": server.media_url("a1.mp3"), "duration": 5.0 } },
            { "data": { "url": server.media_url("v2.mp4"), "duration": 10.0 } },
        ]
    }));
    server.add_media("v1.mp4", b"video-one");
    server.add_media("a1.mp3", b"audio-one");
    server.add_media("v2.mp4", b"video-two");
}

#[tokio::test]
async fn end_to_end_produces_named_output() {
    let server = MockServer::start().await;
    seed_recording(&server);
    let temp = TempDir::new().unwrap();
    let compiler = Arc::new(RecordingCompiler::default());
    let orchestrator = orchestrator(&server, temp.path(), compiler.clone());

    let summary = orchestrator
        .execute(&RecordingRequest::new("1234"), &CancellationToken::new())
        .await
        .unwrap();

    let expected = temp.path().join("Q1_Review").join("Q1_Review.mp4");
    assert_eq!(summary.output_path, expected);
    assert_eq!(summary.recording_name, "Q1_Review");
    assert!(expected.exists());
    assert_eq!(summary.total_duration, 25.0);
    assert_eq!(summary.output_duration, 25.0);
    assert_eq!(orchestrator.state(), PipelineState::Done);

    let jobs = compiler.jobs.lock();
    assert_eq!(jobs.len(), 1);
    assert_eq!(file_names(&jobs[0].video_clips), ["v1.mp4", "v2.mp4"]);
    assert_eq!(file_names(&jobs[0].audio_clips), ["a1.mp3"]);
}

#[tokio::test]
async fn max_duration_caps_output() {
    let server = MockServer::start().await;
    seed_recording(&server);
    let temp = TempDir::new().unwrap();
    let compiler = Arc::new(RecordingCompiler::default());
    let orchestrator = orchestrator(&server, temp.path(), compiler.clone());

    let request = RecordingRequest::new("1234").with_max_duration(Some(12.0));
    let summary = orchestrator
        .execute(&request, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.output_duration, 12.0);
    assert_eq!(compiler.jobs.lock()[0].target_duration(), 12.0);
}

#[tokio::test]
async fn rerun_reuses_downloaded_segments() {
    let server = MockServer::start().await;
    seed_recording(&server);
    let temp = TempDir::new().unwrap();
    let compiler = Arc::new(RecordingCompiler::default());
    let orchestrator = orchestrator(&server, temp.path(), compiler);
    let request = RecordingRequest::new("1234");
    let token = CancellationToken::new();

    assert!(orchestrator.run_download(&request, &token).await);
    assert_eq!(server.media_hits(), 3);

    assert!(orchestrator.run_download(&request, &token).await);
    assert_eq!(server.media_hits(), 3);
    assert_eq!(server.manifest_hits(), 2);
}

#[tokio::test]
async fn parallel_downloads_keep_manifest_order() {
    let server = MockServer::start().await;
    server.set_manifest_json(json!({
        "name": "ordered",
        "eventLogs": [
            { "data": { "url": server.media_url("v1.mp4"), "duration": 1.0 } },
            { "data": { "url": server.media_url("v2.mp4"), "duration": 1.0 } },
            { "data": { "url": server.media_url("v3.mp4"), "duration": 1.0 } },
        ]
    }));
    // The first segment finishes last.
    server.add_media_with("v1.mp4", StatusCode::OK, b"1", Some(Duration::from_millis(300)));
    server.add_media_with("v2.mp4", StatusCode::OK, b"2", Some(Duration::from_millis(100)));
    server.add_media("v3.mp4", b"3");

    let temp = TempDir::new().unwrap();
    let compiler = Arc::new(RecordingCompiler::default());
    let config = PipelineConfig::default()
        .with_output_root(temp.path())
        .with_concurrency(3);
    let orchestrator = orchestrator_with(&server, config, compiler.clone());

    orchestrator
        .execute(&RecordingRequest::new("1"), &CancellationToken::new())
        .await
        .unwrap();

    let jobs = compiler.jobs.lock();
    assert_eq!(file_names(&jobs[0].video_clips), ["v1.mp4", "v2.mp4", "v3.mp4"]);
}

#[tokio::test]
async fn failed_segment_is_skipped_by_default() {
    let server = MockServer::start().await;
    seed_recording(&server);
    server.add_media_with("a1.mp3", StatusCode::INTERNAL_SERVER_ERROR, b"", None);
    let temp = TempDir::new().unwrap();
    let compiler = Arc::new(RecordingCompiler::default());
    let orchestrator = orchestrator(&server, temp.path(), compiler.clone());

    let summary = orchestrator
        .execute(&RecordingRequest::new("1234"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.audio_clips, 0);
    assert_eq!(summary.video_clips, 2);
    assert_eq!(summary.total_duration, 20.0);
}

#[tokio::test]
async fn abort_policy_fails_the_run() {
    let server = MockServer::start().await;
    seed_recording(&server);
    server.add_media_with("a1.mp3", StatusCode::INTERNAL_SERVER_ERROR, b"", None);
    let temp = TempDir::new().unwrap();
    let compiler = Arc::new(RecordingCompiler::default());
    let config = PipelineConfig::default()
        .with_output_root(temp.path())
        .with_failure_policy(SegmentFailurePolicy::Abort);
    let orchestrator = orchestrator_with(&server, config, compiler.clone());

    let err = orchestrator
        .execute(&RecordingRequest::new("1234"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Process(_)), "{err:?}");
    assert!(matches!(orchestrator.state(), PipelineState::Failed(_)));
    assert!(compiler.jobs.lock().is_empty());
}

#[tokio::test]
async fn access_denied_returns_false_before_downloading() {
    let server = MockServer::start().await;
    server.set_manifest(
        StatusCode::FORBIDDEN,
        json!({ "error": { "code": 403 } }).to_string(),
    );
    let temp = TempDir::new().unwrap();
    let compiler = Arc::new(RecordingCompiler::default());
    let orchestrator = orchestrator(&server, temp.path(), compiler.clone());

    let ok = orchestrator
        .run_download(&RecordingRequest::new("1234"), &CancellationToken::new())
        .await;

    assert!(!ok);
    assert_eq!(server.media_hits(), 0);
    assert!(compiler.jobs.lock().is_empty());
    assert!(matches!(orchestrator.state(), PipelineState::Failed(_)));
}

#[tokio::test]
async fn no_clips_means_nothing_to_merge() {
    let server = MockServer::start().await;
    server.set_manifest_json(json!({
        "name": "empty",
        "eventLogs": [
            { "data": { "url": server.media_url("gone.mp4"), "duration": 3.0 } },
        ]
    }));
    let temp = TempDir::new().unwrap();
    let compiler = Arc::new(RecordingCompiler::default());
    let orchestrator = orchestrator(&server, temp.path(), compiler.clone());

    let err = orchestrator
        .execute(&RecordingRequest::new("1234"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, Error::NothingToMerge));
    assert!(compiler.jobs.lock().is_empty());
}

#[tokio::test]
async fn missing_segment_collection_fails() {
    let server = MockServer::start().await;
    server.set_manifest_json(json!({ "name": "no logs" }));
    let temp = TempDir::new().unwrap();
    let orchestrator = orchestrator(&server, temp.path(), Arc::new(RecordingCompiler::default()));

    let err = orchestrator
        .execute(&RecordingRequest::new("1234"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        Error::Process(mtslink_engine::ProcessError::MissingSegments)
    ));
}

#[tokio::test]
async fn cancelled_before_start_fails_fast() {
    let server = MockServer::start().await;
    seed_recording(&server);
    let temp = TempDir::new().unwrap();
    let orchestrator = orchestrator(&server, temp.path(), Arc::new(RecordingCompiler::default()));
    let token = CancellationToken::new();
    token.cancel();

    let err = orchestrator
        .execute(&RecordingRequest::new("1234"), &token)
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(server.media_hits(), 0);
}

#[tokio::test]
async fn cancel_during_downloads_stops_promptly() {
    let server = MockServer::start().await;
    seed_recording(&server);
    for name in ["v1.mp4", "a1.mp3", "v2.mp4"] {
        server.add_media_with(name, StatusCode::OK, b"late", Some(Duration::from_secs(5)));
    }
    let temp = TempDir::new().unwrap();
    let compiler = Arc::new(RecordingCompiler::default());
    let config = PipelineConfig::default()
        .with_output_root(temp.path())
        .with_concurrency(3);
    let orchestrator = orchestrator_with(&server, config, compiler.clone());
    let token = CancellationToken::new();
    let canceller = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        canceller.cancel();
    });

    let started = std::time::Instant::now();
    let err = orchestrator
        .execute(&RecordingRequest::new("1234"), &token)
        .await
        .unwrap_err();

    assert!(err.is_cancelled(), "{err:?}");
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(compiler.jobs.lock().is_empty());
}
