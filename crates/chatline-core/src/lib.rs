//! # chatline-core
//!
//! Shared vocabulary for the chat backend:
//!
//! - [`ids`]: user identities and connection identifiers
//! - [`message`]: the persisted chat record and its closed type enum
//! - [`envelope`]: transient wire units pushed over live connections
//! - [`errors`]: classification, storage and auth error taxonomy
//! - [`collaborators`]: storage and identity traits consumed by the server

#![deny(unsafe_code)]

pub mod collaborators;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod message;

pub use collaborators::{IdentityVerifier, MessageStore};
pub use envelope::{Envelope, PresenceStatus};
pub use errors::{AuthError, ClassificationError, StorageError};
pub use ids::{ConnectionId, UserId};
pub use message::{Message, MessageType, NewMessage};
