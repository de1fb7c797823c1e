use baton_core::session::SessionError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("corrupt row in {table} at sequence {sequence}: {detail}")]
    CorruptRow {
        table: &'static str,
        sequence: i64,
        detail: String,
    },
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::CorruptRow {
                sequence, detail, ..
            } => SessionError::Corrupt {
                sequence,
                message: detail,
            },
            other => SessionError::Storage(other.to_string()),
        }
    }
}
