//! Testing utilities: a controllable codec engine and fixtures.
//!
//! # Example
//!
//! ```rust,ignore
//! use audioconv_core::testing::{fixtures, MockEngine};
//!
//! let engine = MockEngine::new();
//! engine.set_next_error(EngineError::probe_failed("corrupt")).await;
//!
//! let service = ConversionService::new(Arc::new(engine.clone()), SessionConfig::default());
//! ```

mod mock_engine;

pub use mock_engine::{MockEngine, RecordedConversion};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::engine::{SourceInfo, TagMap};
    use std::path::Path;

    /// Create a source description with reasonable defaults.
    pub fn source_info(path: &Path, duration_secs: f64) -> SourceInfo {
        SourceInfo {
            path: path.to_path_buf(),
            size_bytes: 10 * 1024 * 1024, // 10 MB
            duration_secs,
            container: "wav".to_string(),
            stream_index: 0,
            codec: "pcm_s16le".to_string(),
            bitrate_kbps: Some(1411),
            sample_rate: Some(44100),
            channels: Some(2),
            tags: TagMap::new(),
        }
    }

    /// Build a tag map from pairs.
    pub fn tags(pairs: &[(&str, &str)]) -> TagMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}
