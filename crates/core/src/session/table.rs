//! Process-wide table of live sessions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::conversion::Session;
use super::error::SessionError;
use super::SessionId;
use crate::engine::CodecEngine;

/// Maps [`SessionId`]s to live sessions.
///
/// Ids start at 1 and are never reused, so a released id cannot alias a
/// newer session.
pub struct SessionTable {
    next_id: AtomicI64,
    sessions: Mutex<HashMap<SessionId, Arc<Session>>>,
    max_live: Option<usize>,
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new(None)
    }
}

impl SessionTable {
    pub fn new(max_live: Option<usize>) -> Self {
        Self {
            next_id: AtomicI64::new(1),
            sessions: Mutex::new(HashMap::new()),
            max_live,
        }
    }

    /// Creates a session for `input_path` and registers it.
    pub fn create(
        &self,
        input_path: impl Into<PathBuf>,
        engine: Arc<dyn CodecEngine>,
        allow_reconvert: bool,
    ) -> Result<Arc<Session>, SessionError> {
        if let Some(limit) = self.max_live {
            if self.len() >= limit {
                return Err(SessionError::LimitReached { limit });
            }
        }

        let id = SessionId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        let session = Arc::new(Session::create(id, input_path, engine, allow_reconvert)?);

        let mut sessions = self.sessions();
        if let Some(limit) = self.max_live {
            // Another caller may have filled the last slot meanwhile.
            if sessions.len() >= limit {
                drop(sessions);
                return Err(SessionError::LimitReached { limit });
            }
        }
        sessions.insert(id, Arc::clone(&session));
        debug!("Session {} registered ({} live)", id, sessions.len());
        Ok(session)
    }

    /// Looks up a live session.
    pub fn lookup(&self, id: SessionId) -> Result<Arc<Session>, SessionError> {
        self.sessions()
            .get(&id)
            .cloned()
            .ok_or(SessionError::NotFound(id))
    }

    /// Unregisters a session. The caller is responsible for releasing it.
    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions().remove(&id)
    }

    /// Unregisters every session.
    pub fn drain(&self) -> Vec<Arc<Session>> {
        self.sessions().drain().map(|(_, session)| session).collect()
    }

    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, Arc<Session>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
