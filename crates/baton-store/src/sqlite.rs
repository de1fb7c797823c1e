use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;
use tracing::{debug, instrument};

use baton_core::ids::SessionId;
use baton_core::items::Item;
use baton_core::session::{SessionError, SessionStore};

use crate::database::Database;
use crate::error::StoreError;

/// SQLite-backed session store.
///
/// Items are stored one per row, keyed by `(session_id, sequence)`. Sequences
/// are dense per session and assigned inside the appending transaction.
#[derive(Clone)]
pub struct SqliteSessionStore {
    db: Database,
}

impl SqliteSessionStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    fn load_items(&self, session: &SessionId) -> Result<Vec<Item>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sequence, payload FROM session_items
                 WHERE session_id = ?1 ORDER BY sequence ASC",
            )?;
            let rows = stmt.query_map(params![session.as_str()], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?;

            let mut items = Vec::new();
            for row in rows {
                let (sequence, payload) = row?;
                let item = serde_json::from_str::<Item>(&payload).map_err(|e| {
                    StoreError::CorruptRow {
                        table: "session_items",
                        sequence,
                        detail: e.to_string(),
                    }
                })?;
                items.push(item);
            }
            Ok(items)
        })
    }

    fn append_items(&self, session: &SessionId, items: &[Item]) -> Result<(), StoreError> {
        if items.is_empty() {
            return Ok(());
        }
        self.db.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let base: i64 = tx.query_row(
                "SELECT COALESCE(MAX(sequence), 0) FROM session_items WHERE session_id = ?1",
                params![session.as_str()],
                |row| row.get(0),
            )?;
            let now = Utc::now().to_rfc3339();
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO session_items (session_id, sequence, kind, payload, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for (offset, item) in items.iter().enumerate() {
                    let payload = serde_json::to_string(item)?;
                    stmt.execute(params![
                        session.as_str(),
                        base + 1 + offset as i64,
                        item.kind(),
                        payload,
                        now,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }

    fn clear_items(&self, session: &SessionId) -> Result<usize, StoreError> {
        self.db.with_conn(|conn| {
            Ok(conn.execute(
                "DELETE FROM session_items WHERE session_id = ?1",
                params![session.as_str()],
            )?)
        })
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    #[instrument(skip_all, fields(session = %session))]
    async fn load(&self, session: &SessionId) -> Result<Vec<Item>, SessionError> {
        let items = self.load_items(session)?;
        debug!(count = items.len(), "session loaded");
        Ok(items)
    }

    #[instrument(skip_all, fields(session = %session, count = items.len()))]
    async fn append(&self, session: &SessionId, items: &[Item]) -> Result<(), SessionError> {
        self.append_items(session, items)?;
        Ok(())
    }

    #[instrument(skip_all, fields(session = %session))]
    async fn clear(&self, session: &SessionId) -> Result<(), SessionError> {
        let removed = self.clear_items(session)?;
        debug!(removed, "session cleared");
        Ok(())
    }
}
