//! Codec engine: the decode/encode collaborator behind every session.
//!
//! The engine is stateless with respect to sessions. [`CodecEngine::probe`]
//! establishes a decoding context ([`SourceInfo`]) that the session stores and
//! hands back on each [`CodecEngine::transcode`] call.
//!
//! [`FfmpegEngine`] drives the `ffmpeg`/`ffprobe` binaries as child processes
//! and reports progress from ffmpeg's `-progress` stream.
//!
//! # Example
//!
//! ```ignore
//! use audioconv_core::engine::{CodecEngine, FfmpegEngine};
//!
//! let engine = FfmpegEngine::with_defaults();
//! engine.validate().await?;
//!
//! let source = engine.probe(Path::new("/music/song.wav")).await?;
//! println!("{} seconds of {}", source.duration_secs, source.codec);
//! ```

mod config;
mod error;
mod ffmpeg;
mod traits;
mod types;

pub use config::EngineConfig;
pub use error::EngineError;
pub use ffmpeg::FfmpegEngine;
pub use traits::CodecEngine;
pub use types::{cancelled, CancelSignal, SourceInfo, TagMap, TranscodeJob, TranscodeOutput};
