use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use baton_core::ids::SessionId;
use baton_core::items::Item;
use baton_core::session::{SessionError, SessionStore};

/// Process-local session store. Contents are lost when the store is dropped.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<SessionId, Vec<Item>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions with at least one item.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().values().filter(|v| !v.is_empty()).count()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session: &SessionId) -> Result<Vec<Item>, SessionError> {
        Ok(self
            .sessions
            .lock()
            .get(session)
            .cloned()
            .unwrap_or_default())
    }

    async fn append(&self, session: &SessionId, items: &[Item]) -> Result<(), SessionError> {
        if items.is_empty() {
            return Ok(());
        }
        self.sessions
            .lock()
            .entry(session.clone())
            .or_default()
            .extend_from_slice(items);
        Ok(())
    }

    async fn clear(&self, session: &SessionId) -> Result<(), SessionError> {
        self.sessions.lock().remove(session);
        Ok(())
    }
}
