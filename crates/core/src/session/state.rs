//! Session lifecycle states.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a conversion session.
///
/// ```text
/// Created -> Initialized -> Converting -> Completed | Failed
///                 ^                          |
///                 +------- (new attempt) ----+
/// any state -> Released (absorbing)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Input accepted, decoding context not yet established.
    Created,
    /// Ready to accept a conversion request.
    Initialized,
    /// A conversion attempt is in flight.
    Converting,
    /// The last attempt succeeded.
    Completed,
    /// The last attempt failed.
    Failed,
    /// Resources freed; every further operation fails.
    Released,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Initialized => "initialized",
            Self::Converting => "converting",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Released => "released",
        }
    }

    /// Whether the last conversion attempt has finished.
    pub fn is_attempt_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
