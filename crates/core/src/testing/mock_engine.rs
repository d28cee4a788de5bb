//! Mock codec engine for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};

use crate::engine::{
    cancelled, CancelSignal, CodecEngine, EngineError, SourceInfo, TranscodeJob, TranscodeOutput,
};
use crate::progress::ProgressMonitor;

/// A recorded transcode job for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedConversion {
    /// The job that was submitted.
    pub job: TranscodeJob,
    /// Whether the transcode succeeded.
    pub success: bool,
}

/// Mock implementation of the CodecEngine trait.
///
/// Provides controllable behavior for testing:
/// - Track transcode jobs for assertions
/// - Inject a one-shot failure
/// - Control probe results
/// - Hold conversions open until the test lets them go
///
/// Successful transcodes write the effective tags to the output file as
/// `key=value` lines, so tests can check metadata without a real codec.
///
/// # Example
///
/// ```rust,ignore
/// use audioconv_core::testing::MockEngine;
///
/// let engine = MockEngine::new();
/// engine.hold();
///
/// let worker = service.spawn_convert(id, TargetFormat::Flac, "/out/song", tags);
/// engine.wait_for_started(1).await;
/// assert_eq!(service.status(id)?.state, SessionState::Converting);
///
/// engine.open_gate();
/// worker.await??;
/// ```
#[derive(Debug, Clone)]
pub struct MockEngine {
    /// Recorded transcodes.
    conversions: Arc<RwLock<Vec<RecordedConversion>>>,
    /// Pre-configured probe results by path.
    probe_results: Arc<RwLock<HashMap<PathBuf, SourceInfo>>>,
    /// If set, the next operation will fail with this error.
    next_error: Arc<RwLock<Option<EngineError>>>,
    /// Number of progress steps per transcode.
    steps: Arc<RwLock<u8>>,
    /// Delay before each progress step.
    step_delay: Arc<RwLock<Duration>>,
    /// While false, transcodes wait before doing any work.
    gate: Arc<watch::Sender<bool>>,
    /// Number of transcodes that have been entered.
    started: Arc<watch::Sender<usize>>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Create a new mock engine.
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        let (started, _) = watch::channel(0);
        Self {
            conversions: Arc::new(RwLock::new(Vec::new())),
            probe_results: Arc::new(RwLock::new(HashMap::new())),
            next_error: Arc::new(RwLock::new(None)),
            steps: Arc::new(RwLock::new(4)),
            step_delay: Arc::new(RwLock::new(Duration::from_millis(5))),
            gate: Arc::new(gate),
            started: Arc::new(started),
        }
    }

    /// Get all recorded transcodes.
    pub async fn recorded_conversions(&self) -> Vec<RecordedConversion> {
        self.conversions.read().await.clone()
    }

    /// Get the number of transcodes that finished (either way).
    pub async fn conversion_count(&self) -> usize {
        self.conversions.read().await.len()
    }

    /// Set a probe result for a specific path.
    pub async fn set_probe_result(&self, path: impl AsRef<Path>, info: SourceInfo) {
        self.probe_results
            .write()
            .await
            .insert(path.as_ref().to_path_buf(), info);
    }

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: EngineError) {
        *self.next_error.write().await = Some(error);
    }

    /// Clear any pending error.
    pub async fn clear_next_error(&self) {
        *self.next_error.write().await = None;
    }

    /// Set how many progress steps a transcode takes and the delay before each.
    pub async fn set_pacing(&self, steps: u8, step_delay: Duration) {
        *self.steps.write().await = steps.max(1);
        *self.step_delay.write().await = step_delay;
    }

    /// Make subsequent transcodes wait until [`MockEngine::open_gate`].
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    /// Let held transcodes proceed.
    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    /// Number of transcodes entered so far.
    pub fn started_count(&self) -> usize {
        *self.started.borrow()
    }

    /// Wait until at least `count` transcodes have been entered.
    pub async fn wait_for_started(&self, count: usize) {
        let mut started = self.started.subscribe();
        let _ = started.wait_for(|entered| *entered >= count).await;
    }

    /// Take the next error if set.
    async fn take_error(&self) -> Option<EngineError> {
        self.next_error.write().await.take()
    }

    async fn record(&self, job: &TranscodeJob, success: bool) {
        self.conversions.write().await.push(RecordedConversion {
            job: job.clone(),
            success,
        });
    }

    async fn wait_for_gate(&self) {
        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;
    }

    /// Create a default SourceInfo for testing.
    fn create_default_info(path: &Path) -> SourceInfo {
        let container = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("wav")
            .to_string();

        SourceInfo {
            path: path.to_path_buf(),
            size_bytes: std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
            duration_secs: 180.0,
            container,
            stream_index: 0,
            codec: "pcm_s16le".to_string(),
            bitrate_kbps: Some(1411),
            sample_rate: Some(44100),
            channels: Some(2),
            tags: Default::default(),
        }
    }
}

#[async_trait]
impl CodecEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn probe(&self, path: &Path) -> Result<SourceInfo, EngineError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }

        // Check for pre-configured result
        if let Some(info) = self.probe_results.read().await.get(path) {
            return Ok(info.clone());
        }

        if !path.is_file() {
            return Err(EngineError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        Ok(Self::create_default_info(path))
    }

    async fn transcode(
        &self,
        job: &TranscodeJob,
        progress: &ProgressMonitor,
        mut cancel: CancelSignal,
    ) -> Result<TranscodeOutput, EngineError> {
        let start = Instant::now();
        self.started.send_modify(|entered| *entered += 1);

        if let Some(err) = self.take_error().await {
            self.record(job, false).await;
            return Err(err);
        }

        tokio::select! {
            _ = self.wait_for_gate() => {}
            _ = cancelled(&mut cancel) => {
                self.record(job, false).await;
                return Err(EngineError::Cancelled);
            }
        }

        let steps = *self.steps.read().await;
        let step_delay = *self.step_delay.read().await;
        for step in 1..=steps {
            tokio::select! {
                _ = tokio::time::sleep(step_delay) => {}
                _ = cancelled(&mut cancel) => {
                    self.record(job, false).await;
                    return Err(EngineError::Cancelled);
                }
            }
            progress.advance_fraction(f64::from(step) / f64::from(steps));
        }

        let body: String = job
            .effective_tags()
            .iter()
            .map(|(key, value)| format!("{}={}\n", key, value))
            .collect();
        if let Err(e) = tokio::fs::write(&job.output_path, body.as_bytes()).await {
            self.record(job, false).await;
            return Err(EngineError::Io(e));
        }

        self.record(job, true).await;
        Ok(TranscodeOutput {
            output_path: job.output_path.clone(),
            output_size_bytes: body.len() as u64,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn validate(&self) -> Result<(), EngineError> {
        if let Some(err) = self.take_error().await {
            return Err(err);
        }
        Ok(())
    }
}
