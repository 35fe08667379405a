use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;

use crate::models::{Connection, ConnectionRow, Message, PartialMessage, User};
use crate::providers::{AiProvider, ProviderError, StructuredRequest};
use crate::services::generation::{ChatResponder, GenerationError, UpdateStream};
use crate::services::store::{RecordStore, StoreError};
use crate::services::Database;

/// A model that always answers with the same raw text (or always fails).
pub struct ScriptedProvider {
    reply: Option<String>,
    latency: Duration,
    requests: Mutex<Vec<StructuredRequest>>,
}

impl ScriptedProvider {
    pub fn replying(raw: &str) -> Self {
        Self {
            reply: Some(raw.to_string()),
            latency: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            latency: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn last_request(&self) -> Option<StructuredRequest> {
        self.requests.lock().last().cloned()
    }
}

#[async_trait]
impl AiProvider for ScriptedProvider {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn generate_structured(
        &self,
        request: StructuredRequest,
    ) -> Result<String, ProviderError> {
        self.requests.lock().push(request);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.reply
            .clone()
            .ok_or_else(|| ProviderError::NetworkError("connection refused".to_string()))
    }
}

/// A responder that either replays fixed updates or refuses to start.
pub struct ScriptedResponder {
    updates: Option<Vec<PartialMessage>>,
}

impl ScriptedResponder {
    pub fn replaying(updates: Vec<PartialMessage>) -> Self {
        Self {
            updates: Some(updates),
        }
    }

    pub fn unreachable() -> Self {
        Self { updates: None }
    }
}

#[async_trait]
impl ChatResponder for ScriptedResponder {
    async fn respond(
        &self,
        _prompt: &str,
        _active_connections: &[Connection],
        _history: &[Message],
    ) -> Result<UpdateStream, GenerationError> {
        match &self.updates {
            Some(updates) => Ok(Box::pin(stream::iter(updates.clone()))),
            None => Err(GenerationError::Transport("network unreachable".to_string())),
        }
    }
}

/// An in-memory store whose writes can be made to fail on demand.
pub struct FlakyStore {
    pub inner: Database,
    pub fail_connection_writes: AtomicBool,
    pub fail_user_writes: AtomicBool,
    pub fail_message_writes: AtomicBool,
    pub fail_reads: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self {
            inner: Database::new_in_memory().unwrap(),
            fail_connection_writes: AtomicBool::new(false),
            fail_user_writes: AtomicBool::new(false),
            fail_message_writes: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        }
    }

    fn check(flag: &AtomicBool, what: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            Err(StoreError::Backend(anyhow!("{} rejected", what)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn get_user(&self, id: &str) -> Result<User, StoreError> {
        Self::check(&self.fail_reads, "read")?;
        self.inner.get_user(id).await
    }

    async fn insert_user(&self, user: &User) -> Result<User, StoreError> {
        Self::check(&self.fail_user_writes, "user write")?;
        self.inner.insert_user(user).await
    }

    async fn update_actions_used(
        &self,
        user_id: &str,
        actions_used: u32,
    ) -> Result<(), StoreError> {
        Self::check(&self.fail_user_writes, "user write")?;
        self.inner.update_actions_used(user_id, actions_used).await
    }

    async fn list_connections(&self, user_id: &str) -> Result<Vec<ConnectionRow>, StoreError> {
        Self::check(&self.fail_reads, "read")?;
        self.inner.list_connections(user_id).await
    }

    async fn upsert_connection(&self, row: &ConnectionRow) -> Result<ConnectionRow, StoreError> {
        Self::check(&self.fail_connection_writes, "connection write")?;
        self.inner.upsert_connection(row).await
    }

    async fn list_messages(&self, user_id: &str) -> Result<Vec<Message>, StoreError> {
        Self::check(&self.fail_reads, "read")?;
        self.inner.list_messages(user_id).await
    }

    async fn insert_message(&self, user_id: &str, message: &Message) -> Result<(), StoreError> {
        Self::check(&self.fail_message_writes, "message write")?;
        self.inner.insert_message(user_id, message).await
    }
}

/// A signed-in free user that already exists in `store`.
pub async fn seeded_user(store: &FlakyStore, actions_used: u32) -> User {
    let mut user = User::from_identity(&crate::models::Identity {
        id: uuid::Uuid::new_v4().to_string(),
        email: "ada@example.com".to_string(),
        name: Some("Ada".to_string()),
        avatar_url: None,
    });
    user.actions_used = actions_used;
    store.inner.insert_user(&user).await.unwrap()
}
