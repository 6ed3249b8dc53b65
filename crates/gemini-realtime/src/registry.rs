//! Keyed ownership of many independent sessions in one process.
//!
//! Nothing here is implicit: a session lives until [`SessionRegistry::destroy`]
//! (or [`SessionRegistry::shutdown`]) is called for it.

use crate::LiveError;
use crate::config::LiveConfig;
use crate::session::LiveSession;
use parla_audio::AudioSink;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;
use uuid::Uuid;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<LiveSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new, disconnected session under a generated id.
    pub fn create(&self, config: LiveConfig, sink: impl AudioSink + 'static) -> Arc<LiveSession> {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        let id = loop {
            let candidate = Uuid::new_v4().to_string();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        let session = Arc::new(LiveSession::new(id.clone(), config, sink));
        sessions.insert(id.clone(), session.clone());
        info!(session_id = %id, total = sessions.len(), "Session created");
        session
    }

    /// Registers a new session under a caller-chosen id.
    pub fn create_with_id(
        &self,
        id: impl Into<String>,
        config: LiveConfig,
        sink: impl AudioSink + 'static,
    ) -> Result<Arc<LiveSession>, LiveError> {
        let id = id.into();
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if sessions.contains_key(&id) {
            return Err(LiveError::DuplicateSession(id));
        }
        let session = Arc::new(LiveSession::new(id.clone(), config, sink));
        sessions.insert(id.clone(), session.clone());
        info!(session_id = %id, total = sessions.len(), "Session created");
        Ok(session)
    }

    pub fn get(&self, id: &str) -> Option<Arc<LiveSession>> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets the session and disconnects it. Returns false for unknown ids.
    pub async fn destroy(&self, id: &str) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        match removed {
            Some(session) => {
                session.disconnect().await;
                info!(session_id = %id, "Session destroyed");
                true
            }
            None => false,
        }
    }

    /// Destroys every session. Returns how many there were.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<Arc<LiveSession>> = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, session)| session)
            .collect();
        let count = drained.len();
        for session in drained {
            session.disconnect().await;
        }
        if count > 0 {
            info!(count, "All sessions shut down");
        }
        count
    }
}
