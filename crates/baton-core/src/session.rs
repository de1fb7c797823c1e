use std::sync::Arc;

use async_trait::async_trait;

use crate::ids::SessionId;
use crate::items::Item;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session storage error: {0}")]
    Storage(String),
    #[error("corrupt session item at sequence {sequence}: {message}")]
    Corrupt { sequence: i64, message: String },
}

/// Durable conversation log, read before a run and appended after it.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// All items of the session in append order. Unknown sessions are empty.
    async fn load(&self, session: &SessionId) -> Result<Vec<Item>, SessionError>;

    /// Append `items` atomically.
    async fn append(&self, session: &SessionId, items: &[Item]) -> Result<(), SessionError>;

    async fn clear(&self, session: &SessionId) -> Result<(), SessionError>;
}

/// A store together with the session a run should use.
#[derive(Clone)]
pub struct SessionHandle {
    pub store: Arc<dyn SessionStore>,
    pub id: SessionId,
}

impl SessionHandle {
    pub fn new(store: Arc<dyn SessionStore>, id: SessionId) -> Self {
        Self { store, id }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}
