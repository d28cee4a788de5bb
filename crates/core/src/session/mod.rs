//! Conversion sessions and the process-wide handle table.
//!
//! A [`Session`] owns one input, the decoding context established for it and
//! the progress of its current conversion attempt. Sessions live in a
//! [`SessionTable`] keyed by [`SessionId`]; ids come from a monotonic
//! counter and are never reused.
//!
//! # Example
//!
//! ```ignore
//! use audioconv_core::{ConversionService, FfmpegEngine, SessionConfig, TargetFormat};
//!
//! let service = ConversionService::new(Arc::new(FfmpegEngine::with_defaults()), SessionConfig::default());
//!
//! let id = service.create_session("/music/song.wav").await.expect("unreadable input");
//! let worker = service.spawn_convert(id, TargetFormat::Opus, "/music/song", tags);
//!
//! while !worker.is_finished() {
//!     println!("{}%", service.progress(id));
//!     tokio::time::sleep(Duration::from_millis(250)).await;
//! }
//!
//! let report = worker.await??;
//! service.release(id).await;
//! ```

mod conversion;
mod error;
mod state;
mod table;

pub use conversion::{ConversionReport, Session, SessionSnapshot};
pub use error::SessionError;
pub use state::SessionState;
pub use table::SessionTable;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque, process-unique session identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(i64);

impl SessionId {
    /// "No session" marker for hosts that pass raw ids around.
    pub const INVALID: SessionId = SessionId(-1);

    pub fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> i64 {
        self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0 > 0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
