use std::sync::Arc;

use super::notifications::Notifier;
use super::optimistic::{commit_or_revert, Outcome};
use super::session::Session;
use super::store::{RecordStore, StoreError};
use crate::models::{ConnectionId, ConnectionRow};

#[derive(Debug, Clone)]
struct Flip {
    connected: bool,
    team_name: Option<String>,
}

pub struct ConnectionService {
    store: Arc<dyn RecordStore>,
    session: Arc<Session>,
    notifier: Notifier,
}

impl ConnectionService {
    pub fn new(store: Arc<dyn RecordStore>, session: Arc<Session>, notifier: Notifier) -> Self {
        Self {
            store,
            session,
            notifier,
        }
    }

    /// Flip a connection locally, persist it, and put it back if the store
    /// rejects the write. Returns the connection's final state, or `None` when
    /// there was nothing to toggle.
    pub async fn toggle(&self, id: ConnectionId) -> Option<bool> {
        let user_id = self.session.current_user()?.id;

        let outcome: Outcome<ConnectionRow, StoreError> = commit_or_revert(
            &self.session.connections,
            |connections| {
                let conn = connections
                    .iter_mut()
                    .find(|c| c.id == id && !c.coming_soon)?;
                conn.connected = !conn.connected;
                Some(Flip {
                    connected: conn.connected,
                    team_name: conn.team_name.clone(),
                })
            },
            |flip| {
                let row = ConnectionRow {
                    user_id: user_id.clone(),
                    platform: id,
                    connected: flip.connected,
                    team_name: flip.team_name,
                };
                let store = self.store.clone();
                async move { store.upsert_connection(&row).await }
            },
            |connections, flip| {
                if let Some(conn) = connections.iter_mut().find(|c| c.id == id) {
                    conn.connected = !flip.connected;
                }
            },
        )
        .await;

        match outcome {
            Outcome::Skipped => {
                tracing::debug!(connection = id.as_str(), "Connection cannot be toggled");
                None
            }
            Outcome::Committed(row) => {
                let name = self.display_name(id);
                let verb = if row.connected { "connected" } else { "disconnected" };
                self.notifier.success(format!("{} {}.", name, verb));
                Some(row.connected)
            }
            Outcome::Reverted(e) => {
                let name = self.display_name(id);
                tracing::error!(connection = id.as_str(), "Reverting connection toggle: {}", e);
                self.notifier
                    .error(format!("Failed to update {} connection.", name));
                self.session
                    .connections
                    .lock()
                    .iter()
                    .find(|c| c.id == id)
                    .map(|c| c.connected)
            }
        }
    }

    fn display_name(&self, id: ConnectionId) -> String {
        self.session
            .connections
            .lock()
            .iter()
            .find(|c| c.id == id)
            .map(|c| c.name.clone())
            .unwrap_or_else(|| id.as_str().to_string())
    }
}
