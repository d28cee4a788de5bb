//! Session-oriented audio conversion core.
//!
//! A host creates a session for an input file, initializes it (the codec
//! engine probes the source), requests a conversion to one of a closed set of
//! target formats with caller metadata, polls progress, and releases the
//! session. See [`ConversionService`] for the host-facing surface.

pub mod config;
pub mod engine;
pub mod format;
pub mod metrics;
pub mod path;
pub mod progress;
pub mod service;
pub mod session;
pub mod testing;

pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Config,
    ConfigError, HostConfig, LoggingConfig,
};
pub use engine::{CodecEngine, EngineConfig, EngineError, FfmpegEngine, SourceInfo, TagMap};
pub use format::{ContainerKind, FormatId, FormatRegistry, FormatSpec, TargetFormat};
pub use path::{normalize_output_path, normalized_path, would_overwrite};
pub use progress::ProgressMonitor;
pub use service::{ConversionService, SessionConfig};
pub use session::{
    ConversionReport, Session, SessionError, SessionId, SessionSnapshot, SessionState,
    SessionTable,
};
