use async_trait::async_trait;
use chatline_core::{Message, MessageStore, NewMessage, StorageError};
use tracing::warn;

use crate::database::Database;
use crate::messages::MessageRepo;

/// [`MessageStore`] backed by [`MessageRepo`]. The synchronous SQLite call
/// runs on tokio's blocking pool so connection tasks are not stalled.
#[derive(Clone)]
pub struct SqliteMessageStore {
    repo: MessageRepo,
}

impl SqliteMessageStore {
    pub fn new(db: Database) -> Self {
        Self {
            repo: MessageRepo::new(db),
        }
    }

    pub fn repo(&self) -> &MessageRepo {
        &self.repo
    }
}

#[async_trait]
impl MessageStore for SqliteMessageStore {
    async fn persist_message(&self, message: NewMessage) -> Result<Message, StorageError> {
        let repo = self.repo.clone();
        let stored = tokio::task::spawn_blocking(move || repo.insert(&message))
            .await
            .map_err(|e| StorageError::Unavailable(format!("storage task failed: {e}")))?;
        stored.map_err(|e| {
            warn!(error = %e, "failed to persist message");
            StorageError::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatline_core::{MessageType, UserId};

    #[tokio::test]
    async fn persist_roundtrips_through_repo() {
        let store = SqliteMessageStore::new(Database::in_memory().unwrap());
        let stored = store
            .persist_message(NewMessage {
                sender_id: UserId::new(1),
                receiver_id: UserId::new(2),
                message_type: MessageType::Text,
                content: "hi".into(),
            })
            .await
            .unwrap();
        assert_eq!(store.repo().get(stored.id).unwrap(), stored);
        assert_eq!(store.repo().count().unwrap(), 1);
    }

    #[tokio::test]
    async fn storage_failure_surfaces_as_storage_error() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute_batch("DROP TABLE messages;")?;
            Ok(())
        })
        .unwrap();
        let store = SqliteMessageStore::new(db);
        let err = store
            .persist_message(NewMessage {
                sender_id: UserId::new(1),
                receiver_id: UserId::new(2),
                message_type: MessageType::Text,
                content: "lost".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Unavailable(_)));
    }
}
