//! Host-facing conversion service.
//!
//! [`ConversionService`] is the surface a host talks to: it owns the engine
//! and the [`SessionTable`], and addresses sessions by [`SessionId`] only.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::engine::{CodecEngine, TagMap};
use crate::format::FormatId;
use crate::session::{
    ConversionReport, Session, SessionError, SessionId, SessionSnapshot, SessionTable,
};

/// Session policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Whether a session that finished an attempt accepts another one.
    pub allow_reconvert: bool,
    /// Upper bound on concurrently live sessions (unbounded if unset).
    pub max_live_sessions: Option<usize>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            allow_reconvert: true,
            max_live_sessions: None,
        }
    }
}

impl SessionConfig {
    pub fn with_reconvert(mut self, allow: bool) -> Self {
        self.allow_reconvert = allow;
        self
    }

    pub fn with_max_live_sessions(mut self, limit: usize) -> Self {
        self.max_live_sessions = Some(limit);
        self
    }
}

/// Creates, drives and releases conversion sessions.
pub struct ConversionService {
    engine: Arc<dyn CodecEngine>,
    table: SessionTable,
    config: SessionConfig,
}

impl ConversionService {
    pub fn new(engine: Arc<dyn CodecEngine>, config: SessionConfig) -> Self {
        Self {
            engine,
            table: SessionTable::new(config.max_live_sessions),
            config,
        }
    }

    pub fn engine(&self) -> &Arc<dyn CodecEngine> {
        &self.engine
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Creates and initializes a session, reporting why it failed.
    ///
    /// A session whose initialization fails is released and unregistered
    /// before the error is returned.
    pub async fn try_create_session(
        &self,
        input_path: impl AsRef<Path>,
    ) -> Result<SessionId, SessionError> {
        let input_path = input_path.as_ref();
        let session = self.table.create(
            input_path,
            Arc::clone(&self.engine),
            self.config.allow_reconvert,
        )?;

        if let Err(e) = session.initialize().await {
            self.table.remove(session.id());
            session.release().await;
            return Err(e);
        }

        info!(
            "Session {} ready for {} ({} live)",
            session.id(),
            input_path.display(),
            self.table.len()
        );
        Ok(session.id())
    }

    /// Creates and initializes a session. `None` if the input is missing,
    /// unreadable, or cannot be decoded.
    pub async fn create_session(&self, input_path: impl AsRef<Path>) -> Option<SessionId> {
        let input_path = input_path.as_ref();
        match self.try_create_session(input_path).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("No session for {}: {}", input_path.display(), e);
                None
            }
        }
    }

    /// Looks up a live session.
    pub fn session(&self, id: SessionId) -> Result<Arc<Session>, SessionError> {
        self.table.lookup(id)
    }

    /// Converts on the calling task. Blocks (asynchronously) until done.
    pub async fn convert(
        &self,
        id: SessionId,
        format: impl Into<FormatId>,
        output_path: impl AsRef<Path>,
        metadata: TagMap,
    ) -> Result<ConversionReport, SessionError> {
        let session = self.table.lookup(id)?;
        session.convert(format, output_path, metadata).await
    }

    /// Converts and reports plain success or failure.
    pub async fn convert_ok(
        &self,
        id: SessionId,
        format: impl Into<FormatId>,
        output_path: impl AsRef<Path>,
        metadata: TagMap,
    ) -> bool {
        match self.convert(id, format, output_path, metadata).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Conversion on session {} failed: {}", id, e);
                false
            }
        }
    }

    /// Starts a conversion on a Tokio worker and returns its handle.
    ///
    /// Progress can be polled with [`ConversionService::progress`] while the
    /// worker runs.
    pub fn spawn_convert(
        &self,
        id: SessionId,
        format: impl Into<FormatId>,
        output_path: impl Into<PathBuf>,
        metadata: TagMap,
    ) -> JoinHandle<Result<ConversionReport, SessionError>> {
        let session = self.table.lookup(id);
        let format = format.into();
        let output_path = output_path.into();
        tokio::spawn(async move {
            let session = session?;
            session.convert(format, output_path, metadata).await
        })
    }

    /// Percent complete, 0 for unknown or released sessions.
    pub fn progress(&self, id: SessionId) -> u8 {
        self.table
            .lookup(id)
            .map(|session| session.progress())
            .unwrap_or(0)
    }

    pub fn status(&self, id: SessionId) -> Result<SessionSnapshot, SessionError> {
        self.table.lookup(id).map(|session| session.snapshot())
    }

    /// Releases a session. Unknown and already released ids are ignored.
    ///
    /// Waits for an in-flight conversion on the session to stop first.
    pub async fn release(&self, id: SessionId) {
        let Ok(session) = self.table.lookup(id) else {
            return;
        };
        session.release().await;
        self.table.remove(id);
    }

    /// Releases every live session.
    pub async fn release_all(&self) {
        for session in self.table.drain() {
            session.release().await;
        }
    }

    pub fn live_sessions(&self) -> Vec<SessionId> {
        self.table.ids()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use crate::format::TargetFormat;
    use crate::session::SessionState;
    use crate::testing::{fixtures, MockEngine};
    use tempfile::TempDir;

    fn service(engine: &MockEngine) -> ConversionService {
        ConversionService::new(Arc::new(engine.clone()), SessionConfig::default())
    }

    fn input(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("song.wav");
        std::fs::write(&path, b"RIFF").unwrap();
        path
    }

    #[tokio::test]
    async fn test_create_missing_input() {
        let service = service(&MockEngine::new());
        assert!(service.create_session("/nonexistent/song.wav").await.is_none());
        assert!(service.live_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_failed_initialization_unregisters() {
        let dir = TempDir::new().unwrap();
        let engine = MockEngine::new();
        let service = service(&engine);

        engine
            .set_next_error(EngineError::NoAudioStream {
                path: input(&dir),
            })
            .await;
        let result = service.try_create_session(input(&dir)).await;
        assert!(matches!(result, Err(SessionError::InitializationFailed(_))));
        assert!(service.live_sessions().is_empty());
    }

    #[tokio::test]
    async fn test_convert_and_release() {
        let dir = TempDir::new().unwrap();
        let engine = MockEngine::new();
        let service = service(&engine);

        let id = service.create_session(input(&dir)).await.unwrap();
        assert_eq!(service.progress(id), 0);

        assert!(
            service
                .convert_ok(
                    id,
                    TargetFormat::Flac,
                    dir.path().join("song"),
                    fixtures::tags(&[("album", "Album")]),
                )
                .await
        );
        assert_eq!(service.progress(id), 100);
        assert!(dir.path().join("song.flac").exists());

        service.release(id).await;
        assert_eq!(service.progress(id), 0);
        assert!(matches!(service.status(id), Err(SessionError::NotFound(_))));
        // Second release is a no-op.
        service.release(id).await;
    }

    #[tokio::test]
    async fn test_spawn_convert_unknown_session() {
        let service = service(&MockEngine::new());
        let result = service
            .spawn_convert(SessionId::from_raw(7), TargetFormat::Opus, "/tmp/x", TagMap::new())
            .await
            .unwrap();
        assert!(matches!(result, Err(SessionError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_release_all() {
        let dir = TempDir::new().unwrap();
        let engine = MockEngine::new();
        let service = service(&engine);

        let first = service.create_session(input(&dir)).await.unwrap();
        let second = service.create_session(input(&dir)).await.unwrap();
        let session = service.session(first).unwrap();
        assert_ne!(first, second);

        service.release_all().await;
        assert!(service.live_sessions().is_empty());
        assert_eq!(session.state(), SessionState::Released);
    }
}
