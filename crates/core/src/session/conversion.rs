//! The per-session state machine.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::error::SessionError;
use super::state::SessionState;
use super::SessionId;
use crate::engine::{CancelSignal, CodecEngine, EngineError, SourceInfo, TagMap, TranscodeJob};
use crate::format::{FormatId, FormatRegistry, TargetFormat};
use crate::metrics;
use crate::path::{normalize_output_path, would_overwrite};
use crate::progress::ProgressMonitor;

/// Outcome of a successful conversion attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    pub session_id: SessionId,
    pub format: TargetFormat,
    /// Path actually written, after extension normalization.
    pub output_path: PathBuf,
    pub output_size_bytes: u64,
    pub duration_ms: u64,
}

/// Point-in-time view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub state: SessionState,
    pub input_path: PathBuf,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_format: Option<TargetFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_output: Option<PathBuf>,
    pub progress: u8,
}

struct Inner {
    state: SessionState,
    /// Present while an attempt is running.
    cancel_tx: Option<watch::Sender<bool>>,
    last_format: Option<TargetFormat>,
    last_output: Option<PathBuf>,
}

/// One input file and everything needed to convert it.
///
/// State transitions happen under a short synchronous lock, so a second
/// `convert` racing the first is rejected rather than queued. The decoding
/// context sits behind an async lock that a running attempt holds until the
/// engine returns; [`Session::release`] waits on that lock, so the context is
/// never freed underneath a conversion.
pub struct Session {
    id: SessionId,
    input_path: PathBuf,
    created_at: DateTime<Utc>,
    allow_reconvert: bool,
    engine: Arc<dyn CodecEngine>,
    progress: ProgressMonitor,
    inner: Mutex<Inner>,
    context: tokio::sync::Mutex<Option<SourceInfo>>,
}

impl Session {
    /// Accepts `input_path` if it names a readable regular file.
    pub fn create(
        id: SessionId,
        input_path: impl Into<PathBuf>,
        engine: Arc<dyn CodecEngine>,
        allow_reconvert: bool,
    ) -> Result<Self, SessionError> {
        let input_path = input_path.into();
        check_readable(&input_path)?;

        metrics::SESSIONS_CREATED.inc();
        metrics::LIVE_SESSIONS.inc();
        debug!("Session {} created for {}", id, input_path.display());

        Ok(Self {
            id,
            input_path,
            created_at: Utc::now(),
            allow_reconvert,
            engine,
            progress: ProgressMonitor::new(),
            inner: Mutex::new(Inner {
                state: SessionState::Created,
                cancel_tx: None,
                last_format: None,
                last_output: None,
            }),
            context: tokio::sync::Mutex::new(None),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    pub fn state(&self) -> SessionState {
        self.inner().state
    }

    /// Establishes (or re-establishes) the decoding context.
    ///
    /// On failure the session drops back to `Created` with no context.
    pub async fn initialize(&self) -> Result<(), SessionError> {
        self.ensure_idle()?;
        let mut context = self.context.lock().await;
        self.ensure_idle()?;

        match self.engine.probe(&self.input_path).await {
            Ok(source) => {
                debug!(
                    "Session {} probed: {} {:.1}s, stream {}",
                    self.id, source.codec, source.duration_secs, source.stream_index
                );
                let mut inner = self.inner();
                if inner.state == SessionState::Released {
                    return Err(SessionError::SessionReleased(self.id));
                }
                *context = Some(source);
                // A convert may already be queued on the context lock.
                if inner.state != SessionState::Converting {
                    inner.state = SessionState::Initialized;
                }
                info!("Session {} initialized", self.id);
                Ok(())
            }
            Err(e) => {
                warn!("Session {} initialization failed: {}", self.id, e);
                *context = None;
                let mut inner = self.inner();
                if !matches!(
                    inner.state,
                    SessionState::Released | SessionState::Converting
                ) {
                    inner.state = SessionState::Created;
                }
                Err(SessionError::InitializationFailed(e))
            }
        }
    }

    /// Runs one conversion attempt to completion on the calling task.
    ///
    /// A released session rejects the call outright. Otherwise the format
    /// and output location are checked before the attempt starts, so an
    /// unknown id or an output that would clobber the input leaves the
    /// session untouched. `output_path` gets the format's extension appended
    /// if it does not already end with it.
    pub async fn convert(
        &self,
        format: impl Into<FormatId>,
        output_path: impl AsRef<Path>,
        metadata: TagMap,
    ) -> Result<ConversionReport, SessionError> {
        if self.state() == SessionState::Released {
            return Err(self.reject(SessionError::SessionReleased(self.id)));
        }
        let format = FormatRegistry::resolve(format)
            .map(|spec| spec.format)
            .map_err(|e| self.reject(e))?;

        let output_path = output_path.as_ref();
        if would_overwrite(output_path, format, &self.input_path) {
            return Err(self.reject(SessionError::OutputPath {
                path: output_path.to_path_buf(),
                source: io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "output would overwrite the session input",
                ),
            }));
        }

        let attempt = self.begin_attempt(format)?;
        let result = self
            .run_attempt(format, output_path, metadata, attempt.cancel.clone())
            .await;
        attempt.finish(&result);
        result
    }

    /// Percent done of the current or last attempt.
    ///
    /// Zero unless the session is converting or has completed.
    pub fn progress(&self) -> u8 {
        match self.state() {
            SessionState::Converting | SessionState::Completed => self.progress.get(),
            _ => 0,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner();
        let progress = match inner.state {
            SessionState::Converting | SessionState::Completed => self.progress.get(),
            _ => 0,
        };
        SessionSnapshot {
            id: self.id,
            state: inner.state,
            input_path: self.input_path.clone(),
            created_at: self.created_at,
            last_format: inner.last_format,
            last_output: inner.last_output.clone(),
            progress,
        }
    }

    /// Frees the decoding context. Idempotent.
    ///
    /// A running attempt is signalled to stop, and this waits for the engine
    /// to return before the context is dropped.
    pub async fn release(&self) {
        let previous = {
            let mut inner = self.inner();
            let previous = std::mem::replace(&mut inner.state, SessionState::Released);
            if let Some(cancel) = inner.cancel_tx.as_ref() {
                cancel.send_replace(true);
            }
            previous
        };

        if previous == SessionState::Converting {
            info!(
                "Session {} released mid-conversion, waiting for the engine to stop",
                self.id
            );
        }

        let mut context = self.context.lock().await;
        if context.take().is_some() {
            debug!("Session {} decoding context freed", self.id);
        }
        drop(context);

        if previous != SessionState::Released {
            metrics::SESSIONS_RELEASED.inc();
            metrics::LIVE_SESSIONS.dec();
            info!("Session {} released", self.id);
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Released => Err(SessionError::SessionReleased(self.id)),
            SessionState::Converting => Err(SessionError::ConversionInProgress(self.id)),
            _ => Ok(()),
        }
    }

    fn reject(&self, error: SessionError) -> SessionError {
        warn!("Session {} rejected conversion: {}", self.id, error);
        metrics::CONVERSION_REJECTIONS
            .with_label_values(&[error.kind()])
            .inc();
        error
    }

    fn begin_attempt(&self, format: TargetFormat) -> Result<Attempt<'_>, SessionError> {
        let mut inner = self.inner();
        let rejection = match inner.state {
            SessionState::Released => Some(SessionError::SessionReleased(self.id)),
            SessionState::Created => Some(SessionError::NotInitialized(self.id)),
            SessionState::Converting => Some(SessionError::ConversionInProgress(self.id)),
            state if state.is_attempt_finished() && !self.allow_reconvert => {
                Some(SessionError::ReconversionDisabled(self.id))
            }
            _ => None,
        };
        if let Some(error) = rejection {
            drop(inner);
            return Err(self.reject(error));
        }

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.progress.reset();
        inner.state = SessionState::Converting;
        inner.cancel_tx = Some(cancel_tx);
        inner.last_format = Some(format);

        Ok(Attempt {
            session: self,
            format,
            started: Instant::now(),
            cancel: cancel_rx,
            finished: false,
        })
    }

    async fn run_attempt(
        &self,
        format: TargetFormat,
        requested: &Path,
        metadata: TagMap,
        cancel: CancelSignal,
    ) -> Result<ConversionReport, SessionError> {
        let output_path =
            normalize_output_path(requested, format).map_err(|source| SessionError::OutputPath {
                path: requested.to_path_buf(),
                source,
            })?;
        self.inner().last_output = Some(output_path.clone());

        let context = self.context.lock().await;
        let source = match context.as_ref() {
            Some(source) => source.clone(),
            None if self.state() == SessionState::Released => {
                return Err(SessionError::SessionReleased(self.id))
            }
            None => return Err(SessionError::NotInitialized(self.id)),
        };

        info!(
            "Session {} converting {} -> {} ({})",
            self.id,
            self.input_path.display(),
            output_path.display(),
            format
        );

        let job = TranscodeJob {
            session_id: self.id,
            source,
            format,
            output_path,
            metadata,
        };
        let output = self
            .engine
            .transcode(&job, &self.progress, cancel)
            .await
            .map_err(|e| match e {
                EngineError::Cancelled => SessionError::SessionReleased(self.id),
                other => SessionError::ConversionFailed(other),
            })?;
        drop(context);

        Ok(ConversionReport {
            session_id: self.id,
            format,
            output_path: output.output_path,
            output_size_bytes: output.output_size_bytes,
            duration_ms: output.duration_ms,
        })
    }

    fn end_attempt(
        &self,
        format: TargetFormat,
        started: Instant,
        result: Option<&Result<ConversionReport, SessionError>>,
    ) {
        let label = match result {
            Some(Ok(_)) => "success",
            Some(Err(SessionError::SessionReleased(_))) => "cancelled",
            Some(Err(_)) => "failed",
            None => "abandoned",
        };
        let format_label = format.to_string();
        metrics::CONVERSIONS_TOTAL
            .with_label_values(&[format_label.as_str(), label])
            .inc();
        metrics::CONVERSION_DURATION
            .with_label_values(&[format_label.as_str()])
            .observe(started.elapsed().as_secs_f64());

        let mut inner = self.inner();
        inner.cancel_tx = None;
        if inner.state != SessionState::Converting {
            // Released while running
            return;
        }

        match result {
            Some(Ok(report)) => {
                self.progress.complete();
                inner.state = SessionState::Completed;
                info!(
                    "Session {} completed {} in {} ms ({} bytes)",
                    self.id,
                    report.output_path.display(),
                    report.duration_ms,
                    report.output_size_bytes
                );
            }
            Some(Err(e)) => {
                inner.state = SessionState::Failed;
                warn!("Session {} conversion failed: {}", self.id, e);
            }
            None => {
                inner.state = SessionState::Failed;
                warn!("Session {} conversion abandoned by caller", self.id);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if inner.state != SessionState::Released {
            warn!("Session {} dropped without release", self.id);
            inner.state = SessionState::Released;
            metrics::SESSIONS_RELEASED.inc();
            metrics::LIVE_SESSIONS.dec();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("input_path", &self.input_path)
            .field("engine", &self.engine.name())
            .field("state", &self.state())
            .finish()
    }
}

/// One running attempt. Dropping it unfinished (the `convert` future was
/// cancelled) marks the attempt failed.
struct Attempt<'a> {
    session: &'a Session,
    format: TargetFormat,
    started: Instant,
    cancel: CancelSignal,
    finished: bool,
}

impl Attempt<'_> {
    fn finish(mut self, result: &Result<ConversionReport, SessionError>) {
        self.finished = true;
        self.session.end_attempt(self.format, self.started, Some(result));
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.session.end_attempt(self.format, self.started, None);
        }
    }
}

fn check_readable(path: &Path) -> Result<(), SessionError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| SessionError::creation_failed(path, e.to_string()))?;
    if !metadata.is_file() {
        return Err(SessionError::creation_failed(path, "not a regular file"));
    }
    File::open(path).map_err(|e| SessionError::creation_failed(path, e.to_string()))?;
    Ok(())
}
