//! Infrastructure layer: SQLite persistence, session storage and the job queue.

pub mod db;
pub mod jobs;
pub mod sessions;

pub use db::{Database, DbError};
pub use sessions::SqliteSessionStore;
