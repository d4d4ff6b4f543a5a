//! Interfaces the routing core consumes from its collaborators.

use async_trait::async_trait;

use crate::errors::{AuthError, StorageError};
use crate::ids::UserId;
use crate::message::{Message, NewMessage};

/// Durable message storage. One call per inbound chat frame; the returned
/// record carries the storage-assigned `id` and `created_at`.
#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn persist_message(&self, message: NewMessage) -> Result<Message, StorageError>;
}

/// Resolves a credential presented at connection time to a user identity.
pub trait IdentityVerifier: Send + Sync {
    fn verify_identity(&self, credential: &str) -> Result<UserId, AuthError>;
}
