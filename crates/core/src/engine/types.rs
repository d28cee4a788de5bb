//! Types exchanged with the codec engine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio::sync::watch;

use crate::format::TargetFormat;
use crate::session::SessionId;

/// Tag name to tag value, embedded verbatim into the output container.
pub type TagMap = BTreeMap<String, String>;

/// Cancellation signal handed to a running transcode. Flips to `true` when
/// the owning session is released mid-conversion.
pub type CancelSignal = watch::Receiver<bool>;

/// Resolves once `signal` is raised. Never resolves if the sender is gone
/// without raising it.
pub async fn cancelled(signal: &mut CancelSignal) {
    let raised = signal.wait_for(|raised| *raised).await.is_ok();
    if !raised {
        std::future::pending::<()>().await;
    }
}

/// Decoding context established when a session is initialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Input path.
    pub path: PathBuf,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Duration in seconds (0.0 when unknown).
    pub duration_secs: f64,
    /// Container format (e.g., "wav", "flac").
    pub container: String,
    /// Index of the selected audio stream within the container.
    pub stream_index: u32,
    /// Audio codec of the selected stream.
    pub codec: String,
    /// Audio bitrate in kbps (if known).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate_kbps: Option<u32>,
    /// Sample rate in Hz (if known).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    /// Channel count (if known).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channels: Option<u8>,
    /// Container-level tags carried over to the output.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: TagMap,
}

/// A single decode -> encode request.
#[derive(Debug, Clone)]
pub struct TranscodeJob {
    /// Owning session, for logging.
    pub session_id: SessionId,
    /// Source established at initialize.
    pub source: SourceInfo,
    /// Target format.
    pub format: TargetFormat,
    /// Normalized output path.
    pub output_path: PathBuf,
    /// Caller metadata, applied over the source tags.
    pub metadata: TagMap,
}

impl TranscodeJob {
    /// Tags to write: source container tags overlaid with caller metadata.
    pub fn effective_tags(&self) -> TagMap {
        let mut tags = self.source.tags.clone();
        tags.extend(
            self.metadata
                .iter()
                .map(|(key, value)| (key.clone(), value.clone())),
        );
        tags
    }
}

/// Result of a successful transcode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscodeOutput {
    /// Output file path.
    pub output_path: PathBuf,
    /// Output file size in bytes.
    pub output_size_bytes: u64,
    /// Wall-clock time spent in the engine, in milliseconds.
    pub duration_ms: u64,
}
