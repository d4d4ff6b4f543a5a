//! # chatline-store
//!
//! SQLite-backed storage collaborator for chat messages.
//!
//! [`Database`] wraps a single connection behind a mutex; [`MessageRepo`]
//! holds the SQL; [`SqliteMessageStore`] adapts the repo to the async
//! [`chatline_core::MessageStore`] trait by running it on the blocking pool.

#![deny(unsafe_code)]

pub mod database;
pub mod error;
pub mod messages;
pub mod row_helpers;
pub mod schema;
pub mod sqlite_store;

pub use database::Database;
pub use error::StoreError;
pub use messages::{MessageRepo, Page};
pub use sqlite_store::SqliteMessageStore;
