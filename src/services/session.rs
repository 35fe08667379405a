use std::sync::Arc;

use parking_lot::Mutex;

use super::conversation::ConversationController;
use super::notifications::Notifier;
use super::store::RecordStore;
use crate::models::connection::{catalog, overlay};
use crate::models::{Connection, Identity, User};

/// State shared by everything that acts on behalf of the signed-in user.
pub struct Session {
    pub user: Mutex<Option<User>>,
    pub connections: Mutex<Vec<Connection>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            user: Mutex::new(None),
            connections: Mutex::new(catalog()),
        }
    }

    pub fn current_user(&self) -> Option<User> {
        self.user.lock().clone()
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.connections.lock().clone()
    }

    /// Connections the assistant may suggest actions for.
    pub fn active_connections(&self) -> Vec<Connection> {
        self.connections
            .lock()
            .iter()
            .filter(|c| c.connected && !c.coming_soon)
            .cloned()
            .collect()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

pub struct SessionService {
    store: Arc<dyn RecordStore>,
    session: Arc<Session>,
    conversation: Arc<ConversationController>,
    notifier: Notifier,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        session: Arc<Session>,
        conversation: Arc<ConversationController>,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            session,
            conversation,
            notifier,
        }
    }

    /// Load (or create) the account for `identity`, then its connections and
    /// conversation history. Returns `None` if the account could not be
    /// established; the session stays signed out in that case.
    pub async fn sign_in(&self, identity: &Identity) -> Option<User> {
        let user = match self.store.get_user(&identity.id).await {
            Ok(user) => user,
            Err(e) if e.is_not_found() => {
                tracing::info!(user_id = %identity.id, "Creating account for new user");
                match self.store.insert_user(&User::from_identity(identity)).await {
                    Ok(user) => user,
                    Err(e) => {
                        tracing::error!("Error creating user: {}", e);
                        self.notifier.error("Error setting up your account.");
                        return None;
                    }
                }
            }
            Err(e) => {
                tracing::error!("Error fetching user: {}", e);
                self.notifier.error("Error fetching your profile.");
                return None;
            }
        };

        *self.session.user.lock() = Some(user.clone());

        let connections = match self.store.list_connections(&user.id).await {
            Ok(rows) => overlay(catalog(), &rows),
            Err(e) => {
                tracing::error!("Error fetching connections: {}", e);
                catalog()
            }
        };
        *self.session.connections.lock() = connections;

        match self.store.list_messages(&user.id).await {
            Ok(messages) => {
                tracing::debug!(count = messages.len(), "Loaded conversation history");
                self.conversation.replace(messages);
            }
            Err(e) => {
                tracing::error!("Error fetching messages: {}", e);
                self.conversation.replace(Vec::new());
            }
        }

        Some(user)
    }

    pub fn sign_out(&self) {
        *self.session.user.lock() = None;
        *self.session.connections.lock() = catalog();
        self.conversation.replace(Vec::new());
        tracing::info!("Signed out");
    }
}
