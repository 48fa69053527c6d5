//! SQLite persistence: the engine event log and the store of notifications
//! still pending at shutdown. All access goes through one worker thread.

pub mod connection;
pub mod helpers;
mod migrations;
pub mod models;
pub mod repositories;

pub use connection::Database;
pub use models::StoredEvent;
pub use repositories::events::SqliteSink;
