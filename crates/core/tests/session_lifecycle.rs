//! Session lifecycle integration tests.
//!
//! These tests drive the host-facing service against the mock engine:
//! created -> initialized -> converting -> completed | failed -> released

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use audioconv_core::{
    engine::EngineError,
    testing::{fixtures, MockEngine},
    ConversionService, FormatId, SessionConfig, SessionError, SessionId, SessionState, TagMap,
    TargetFormat,
};

/// Test helper holding the service, its engine and a scratch directory.
struct TestHarness {
    service: Arc<ConversionService>,
    engine: MockEngine,
    temp_dir: TempDir,
}

impl TestHarness {
    async fn new() -> Self {
        Self::with_config(SessionConfig::default()).await
    }

    async fn with_config(config: SessionConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let engine = MockEngine::new();

        // Fast but observable conversions
        engine.set_pacing(10, Duration::from_millis(2)).await;

        let service = Arc::new(ConversionService::new(Arc::new(engine.clone()), config));
        Self {
            service,
            engine,
            temp_dir,
        }
    }

    /// Writes a stand-in PCM source and registers a 3 minute probe result for it.
    async fn source(&self, name: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, vec![0u8; 4096]).expect("Failed to write source");
        self.engine
            .set_probe_result(&path, fixtures::source_info(&path, 180.0))
            .await;
        path
    }

    fn out(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    fn state(&self, id: SessionId) -> SessionState {
        self.service.status(id).expect("session should be live").state
    }
}

#[tokio::test]
async fn test_opus_conversion_scenario() {
    let harness = TestHarness::new().await;
    let input = harness.source("song.wav").await;

    let id = harness.service.create_session(&input).await.unwrap();
    assert_eq!(harness.state(id), SessionState::Initialized);
    assert_eq!(harness.service.progress(id), 0);

    let report = harness
        .service
        .convert(
            id,
            TargetFormat::Opus,
            harness.out("song"),
            fixtures::tags(&[("title", "Song")]),
        )
        .await
        .unwrap();

    assert!(report.output_path.to_string_lossy().ends_with(".ogg"));
    assert_eq!(report.output_path, harness.out("song.ogg"));
    assert_eq!(harness.service.progress(id), 100);
    assert_eq!(harness.state(id), SessionState::Completed);

    let written = std::fs::read_to_string(&report.output_path).unwrap();
    assert!(written.lines().any(|line| line == "title=Song"));

    let recorded = harness.engine.recorded_conversions().await;
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].job.format, TargetFormat::Opus);
    assert_eq!(recorded[0].job.source.duration_secs, 180.0);

    harness.service.release(id).await;
}

#[tokio::test]
async fn test_nonexistent_input_yields_no_session() {
    let harness = TestHarness::new().await;

    assert!(harness.service.create_session("/no/such/file").await.is_none());
    assert!(matches!(
        harness.service.try_create_session("/no/such/file").await,
        Err(SessionError::CreationFailed { .. })
    ));
    assert!(harness.service.live_sessions().is_empty());
}

#[tokio::test]
async fn test_undecodable_input_yields_no_session() {
    let harness = TestHarness::new().await;
    let input = harness.source("broken.wav").await;

    harness
        .engine
        .set_next_error(EngineError::NoAudioStream {
            path: input.clone(),
        })
        .await;
    assert!(harness.service.create_session(&input).await.is_none());
    assert!(harness.service.live_sessions().is_empty());
}

#[tokio::test]
async fn test_empty_metadata_is_accepted() {
    let harness = TestHarness::new().await;
    let input = harness.source("song.wav").await;
    let id = harness.service.create_session(&input).await.unwrap();

    assert!(
        harness
            .service
            .convert_ok(id, TargetFormat::Mp3, harness.out("song.mp3"), TagMap::new())
            .await
    );
    assert!(harness.out("song.mp3").exists());
    harness.service.release(id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_converts_one_proceeds() {
    let harness = TestHarness::new().await;
    let input = harness.source("song.wav").await;
    let id = harness.service.create_session(&input).await.unwrap();

    harness.engine.hold();
    let first = harness
        .service
        .spawn_convert(id, TargetFormat::Flac, harness.out("a"), TagMap::new());
    harness.engine.wait_for_started(1).await;
    assert_eq!(harness.state(id), SessionState::Converting);

    let progress_before = harness.service.progress(id);
    let second = harness
        .service
        .convert(id, TargetFormat::Flac, harness.out("b"), TagMap::new())
        .await;
    assert!(matches!(second, Err(SessionError::ConversionInProgress(_))));
    assert!(harness.service.progress(id) >= progress_before);
    assert_eq!(harness.state(id), SessionState::Converting);

    harness.engine.open_gate();
    let report = first.await.unwrap().unwrap();
    assert_eq!(report.output_path, harness.out("a.flac"));
    assert!(!harness.out("b.flac").exists());
    assert_eq!(harness.engine.started_count(), 1);

    harness.service.release(id).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_progress_is_monotonic_and_reaches_100() {
    let harness = TestHarness::new().await;
    harness.engine.set_pacing(50, Duration::from_millis(1)).await;
    let input = harness.source("song.wav").await;
    let id = harness.service.create_session(&input).await.unwrap();

    let worker = harness
        .service
        .spawn_convert(id, TargetFormat::Vorbis, harness.out("song"), TagMap::new());

    let mut last = 0;
    while !worker.is_finished() {
        let current = harness.service.progress(id);
        assert!(current <= 100);
        assert!(current >= last, "progress went from {} to {}", last, current);
        last = current;
        tokio::task::yield_now().await;
    }

    worker.await.unwrap().unwrap();
    assert_eq!(harness.service.progress(id), 100);
    harness.service.release(id).await;
}

#[tokio::test]
async fn test_unsupported_format_leaves_session_initialized() {
    let harness = TestHarness::new().await;
    let input = harness.source("song.wav").await;
    let id = harness.service.create_session(&input).await.unwrap();

    assert!(
        !harness
            .service
            .convert_ok(id, FormatId(1), harness.out("song"), TagMap::new())
            .await
    );
    assert_eq!(harness.state(id), SessionState::Initialized);
    assert_eq!(harness.service.progress(id), 0);
    assert_eq!(harness.engine.started_count(), 0);

    // A valid format still works afterwards.
    assert!(
        harness
            .service
            .convert_ok(id, TargetFormat::Flac.id(), harness.out("song"), TagMap::new())
            .await
    );
    harness.service.release(id).await;
}

#[tokio::test]
async fn test_failed_conversion_then_retry() {
    let harness = TestHarness::new().await;
    let input = harness.source("song.wav").await;
    let id = harness.service.create_session(&input).await.unwrap();

    harness
        .engine
        .set_next_error(EngineError::conversion_failed("disk full", None))
        .await;
    let result = harness
        .service
        .convert(id, TargetFormat::Mp3, harness.out("song"), TagMap::new())
        .await;
    assert!(matches!(result, Err(SessionError::ConversionFailed(_))));
    assert_eq!(harness.state(id), SessionState::Failed);
    assert_eq!(harness.service.progress(id), 0);

    harness
        .service
        .convert(id, TargetFormat::Mp3, harness.out("song"), TagMap::new())
        .await
        .unwrap();
    assert_eq!(harness.state(id), SessionState::Completed);
    harness.service.release(id).await;
}

#[tokio::test]
async fn test_reconversion_can_be_disabled() {
    let harness =
        TestHarness::with_config(SessionConfig::default().with_reconvert(false)).await;
    let input = harness.source("song.wav").await;
    let id = harness.service.create_session(&input).await.unwrap();

    harness
        .service
        .convert(id, TargetFormat::Opus, harness.out("song"), TagMap::new())
        .await
        .unwrap();
    let again = harness
        .service
        .convert(id, TargetFormat::Opus, harness.out("song"), TagMap::new())
        .await;
    assert!(matches!(again, Err(SessionError::ReconversionDisabled(_))));
    harness.service.release(id).await;
}

#[tokio::test]
async fn test_release_twice_and_before_conversion() {
    let harness = TestHarness::new().await;
    let input = harness.source("song.wav").await;
    let id = harness.service.create_session(&input).await.unwrap();
    let session = harness.service.session(id).unwrap();

    harness.service.release(id).await;
    harness.service.release(id).await;
    session.release().await;

    assert_eq!(session.state(), SessionState::Released);
    assert_eq!(harness.service.progress(id), 0);
    assert!(matches!(
        harness
            .service
            .convert(id, TargetFormat::Flac, harness.out("song"), TagMap::new())
            .await,
        Err(SessionError::NotFound(_))
    ));
    assert!(matches!(
        session
            .convert(TargetFormat::Flac, harness.out("song"), TagMap::new())
            .await,
        Err(SessionError::SessionReleased(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_release_during_conversion_waits_and_cancels() {
    let harness = TestHarness::new().await;
    let input = harness.source("song.wav").await;
    let id = harness.service.create_session(&input).await.unwrap();
    let session = harness.service.session(id).unwrap();

    harness.engine.hold();
    let worker = harness
        .service
        .spawn_convert(id, TargetFormat::Opus, harness.out("song"), TagMap::new());
    harness.engine.wait_for_started(1).await;

    harness.service.release(id).await;
    // Release returned, so the engine has already let go of the context.
    assert_eq!(harness.engine.conversion_count().await, 1);
    assert_eq!(session.state(), SessionState::Released);

    let result = worker.await.unwrap();
    assert!(matches!(result, Err(SessionError::SessionReleased(_))));
    assert!(!harness.out("song.ogg").exists());
    assert!(harness.service.live_sessions().is_empty());
}

#[tokio::test]
async fn test_ids_never_reused() {
    let harness = TestHarness::new().await;
    let input = harness.source("song.wav").await;

    let first = harness.service.create_session(&input).await.unwrap();
    harness.service.release(first).await;
    let second = harness.service.create_session(&input).await.unwrap();

    assert_ne!(first, second);
    assert!(matches!(
        harness.service.status(first),
        Err(SessionError::NotFound(_))
    ));
    harness.service.release_all().await;
}

#[tokio::test]
async fn test_live_session_limit() {
    let harness =
        TestHarness::with_config(SessionConfig::default().with_max_live_sessions(1)).await;
    let input = harness.source("song.wav").await;

    let first = harness.service.create_session(&input).await.unwrap();
    assert!(matches!(
        harness.service.try_create_session(&input).await,
        Err(SessionError::LimitReached { limit: 1 })
    ));

    harness.service.release(first).await;
    assert!(harness.service.create_session(&input).await.is_some());
    harness.service.release_all().await;
}

#[tokio::test]
async fn test_default_output_never_moves_extensionless_input() {
    let harness = TestHarness::new().await;
    let input = harness.source("recording").await;
    let id = harness.service.create_session(&input).await.unwrap();

    let result = harness
        .service
        .convert(id, TargetFormat::Flac, input.with_extension(""), TagMap::new())
        .await;

    assert!(matches!(result, Err(SessionError::OutputPath { .. })));
    assert!(input.exists());
    assert!(!harness.out("recording.flac").exists());
    assert_eq!(harness.state(id), SessionState::Initialized);
    harness.service.release(id).await;
}
