use async_trait::async_trait;
use thiserror::Error;

use crate::models::{ConnectionRow, Message, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// The persistence surface the chat core relies on: users keyed by id,
/// connections keyed by (user, platform), messages keyed by id and read back
/// in creation order.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_user(&self, id: &str) -> Result<User, StoreError>;

    async fn insert_user(&self, user: &User) -> Result<User, StoreError>;

    async fn update_actions_used(&self, user_id: &str, actions_used: u32)
        -> Result<(), StoreError>;

    async fn list_connections(&self, user_id: &str) -> Result<Vec<ConnectionRow>, StoreError>;

    async fn upsert_connection(&self, row: &ConnectionRow) -> Result<ConnectionRow, StoreError>;

    async fn list_messages(&self, user_id: &str) -> Result<Vec<Message>, StoreError>;

    async fn insert_message(&self, user_id: &str, message: &Message) -> Result<(), StoreError>;
}
