//! Trait definitions for the codec engine.

use async_trait::async_trait;
use std::path::Path;

use super::error::EngineError;
use super::types::{CancelSignal, SourceInfo, TranscodeJob, TranscodeOutput};
use crate::progress::ProgressMonitor;

/// The decode/encode collaborator behind every session.
///
/// Implementations own no per-session state: the session holds the
/// [`SourceInfo`] returned by [`CodecEngine::probe`] and hands it back on
/// every [`CodecEngine::transcode`] call.
#[async_trait]
pub trait CodecEngine: Send + Sync {
    /// Returns the name of this engine implementation.
    fn name(&self) -> &str;

    /// Opens the input and establishes the decoding context.
    async fn probe(&self, path: &Path) -> Result<SourceInfo, EngineError>;

    /// Decodes the source and re-encodes it into the job's target format.
    ///
    /// Progress is published into `progress` and must not regress. The
    /// engine stops at 99; the session marks 100 once the attempt succeeds.
    /// When `cancel` is raised the engine aborts and returns
    /// [`EngineError::Cancelled`].
    async fn transcode(
        &self,
        job: &TranscodeJob,
        progress: &ProgressMonitor,
        cancel: CancelSignal,
    ) -> Result<TranscodeOutput, EngineError>;

    /// Validates that the engine is properly configured and ready.
    async fn validate(&self) -> Result<(), EngineError>;
}
