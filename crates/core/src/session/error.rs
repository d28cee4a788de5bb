//! Error types for sessions.

use std::path::PathBuf;
use thiserror::Error;

use super::SessionId;
use crate::engine::EngineError;
use crate::format::FormatId;

/// Errors surfaced at the session boundary.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The input is missing or unreadable; no session was created.
    #[error("Failed to create session for {path}: {reason}")]
    CreationFailed { path: PathBuf, reason: String },

    /// The engine could not establish a decoding context.
    #[error("Session initialization failed: {0}")]
    InitializationFailed(#[source] EngineError),

    /// Conversion requested before a successful initialize.
    #[error("Session {0} is not initialized")]
    NotInitialized(SessionId),

    /// Format identifier outside the supported set.
    #[error("Unsupported format identifier: {id}")]
    UnsupportedFormat { id: FormatId },

    /// Another conversion is already running on this session.
    #[error("Session {0} already has a conversion in flight")]
    ConversionInProgress(SessionId),

    /// The session finished an attempt and re-conversion is disabled.
    #[error("Session {0} does not accept another conversion")]
    ReconversionDisabled(SessionId),

    /// The output location could not be prepared.
    #[error("Failed to prepare output path {path}: {source}")]
    OutputPath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Decode/encode failed.
    #[error("Conversion failed: {0}")]
    ConversionFailed(#[source] EngineError),

    /// The session was released.
    #[error("Session {0} has been released")]
    SessionReleased(SessionId),

    /// No live session with this id.
    #[error("Session {0} not found")]
    NotFound(SessionId),

    /// Too many live sessions.
    #[error("Live session limit of {limit} reached")]
    LimitReached { limit: usize },
}

impl SessionError {
    /// Creates a new creation failed error.
    pub fn creation_failed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Whether the id no longer refers to a live session.
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::SessionReleased(_) | Self::NotFound(_))
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreationFailed { .. } => "creation_failed",
            Self::InitializationFailed(_) => "initialization_failed",
            Self::NotInitialized(_) => "not_initialized",
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::ConversionInProgress(_) => "conversion_in_progress",
            Self::ReconversionDisabled(_) => "reconversion_disabled",
            Self::OutputPath { .. } => "output_path",
            Self::ConversionFailed(_) => "conversion_failed",
            Self::SessionReleased(_) => "session_released",
            Self::NotFound(_) => "not_found",
            Self::LimitReached { .. } => "limit_reached",
        }
    }
}
