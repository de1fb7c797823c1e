pub mod database;
pub mod error;
pub mod memory;
pub mod schema;
pub mod sqlite;

pub use database::Database;
pub use error::StoreError;
pub use memory::MemorySessionStore;
pub use sqlite::SqliteSessionStore;
