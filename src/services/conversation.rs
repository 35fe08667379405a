use std::sync::Arc;

use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::generation::ChatResponder;
use super::notifications::Notifier;
use super::store::RecordStore;
use crate::config::CONNECTION_FALLBACK;
use crate::models::{Connection, Message, PartialMessage, User};

/// What changed in the visible conversation.
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    Appended(Message),
    Updated(Message),
    /// The assistant turn with this id will not change again.
    Finished(String),
    /// The whole list was replaced (load or sign-out).
    Reset,
}

/// Owns the message list of the signed-in user's conversation.
pub struct ConversationController {
    store: Arc<dyn RecordStore>,
    responder: Arc<dyn ChatResponder>,
    notifier: Notifier,
    messages: Mutex<Vec<Message>>,
    events: broadcast::Sender<ConversationEvent>,
}

impl ConversationController {
    pub fn new(
        store: Arc<dyn RecordStore>,
        responder: Arc<dyn ChatResponder>,
        notifier: Notifier,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            store,
            responder,
            notifier,
            messages: Mutex::new(Vec::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events.subscribe()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().clone()
    }

    pub fn find_message(&self, id: &str) -> Option<Message> {
        self.messages.lock().iter().find(|m| m.id == id).cloned()
    }

    /// Replace the conversation, e.g. with the history loaded at sign-in.
    pub fn replace(&self, messages: Vec<Message>) {
        *self.messages.lock() = messages;
        self.emit(ConversationEvent::Reset);
    }

    /// Send a user turn and drive the assistant's answer to completion.
    ///
    /// Returns the id of the assistant message, or `None` when nobody is
    /// signed in.
    pub async fn send_message(
        &self,
        text: &str,
        user: Option<&User>,
        active_connections: &[Connection],
    ) -> Option<String> {
        let Some(user) = user else {
            tracing::debug!("Ignoring message sent while signed out");
            return None;
        };

        let user_message = Message::user(text);
        let history = {
            let mut messages = self.messages.lock();
            messages.push(user_message.clone());
            messages.clone()
        };
        self.emit(ConversationEvent::Appended(user_message.clone()));

        // Saving the prompt must not hold up the answer.
        let user_write = {
            let store = self.store.clone();
            let user_id = user.id.clone();
            tokio::spawn(async move {
                if let Err(e) = store.insert_message(&user_id, &user_message).await {
                    tracing::error!("Failed to save user message: {}", e);
                }
            })
        };

        let placeholder = Message::placeholder();
        let model_id = placeholder.id.clone();
        self.messages.lock().push(placeholder.clone());
        self.emit(ConversationEvent::Appended(placeholder));

        let mut received_any = false;
        match self
            .responder
            .respond(text, active_connections, &history)
            .await
        {
            Ok(mut stream) => {
                let mut terminated = false;
                while let Some(update) = stream.next().await {
                    received_any = true;
                    terminated = update.is_terminal();
                    self.apply_update(&model_id, &update);
                }
                if !received_any {
                    tracing::warn!("Assistant stream ended without any update");
                } else if !terminated {
                    tracing::warn!("Assistant stream ended before its final update");
                }
            }
            Err(e) => {
                tracing::error!("Error getting chat response: {}", e);
            }
        }

        if !received_any {
            self.apply_update(
                &model_id,
                &PartialMessage::terminal(CONNECTION_FALLBACK, Vec::new()),
            );
            self.notifier.error("Sorry, something went wrong with the AI.");
        }

        if let Err(e) = user_write.await {
            tracing::error!("User message write task failed: {}", e);
        }

        if let Some(final_message) = self.find_message(&model_id) {
            if let Err(e) = self.store.insert_message(&user.id, &final_message).await {
                tracing::error!("Failed to save assistant message: {}", e);
            }
        }
        self.emit(ConversationEvent::Finished(model_id.clone()));

        Some(model_id)
    }

    /// Write a streamed update into the message with `id`. Other messages and
    /// the list order are left alone.
    pub fn apply_update(&self, id: &str, update: &PartialMessage) -> Option<Message> {
        let updated = {
            let mut messages = self.messages.lock();
            let message = messages.iter_mut().find(|m| m.id == id)?;
            message.apply(update);
            message.clone()
        };
        self.emit(ConversationEvent::Updated(updated.clone()));
        Some(updated)
    }

    fn emit(&self, event: ConversationEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::models::connection::catalog;
    use crate::models::{ConnectionId, Role, ToastKind};
    use crate::services::generation::GenerationClient;
    use crate::services::settings::ChatSettings;
    use crate::testing::{seeded_user, FlakyStore, ScriptedProvider, ScriptedResponder};

    const PROMPT: &str = "Draft an email to the team about Friday's deadline";

    const GMAIL_REPLY: &str = r#"{
        "text": "Sure! Here's a draft reminding the team about Friday.",
        "actions": [{
            "type": "gmail",
            "label": "Draft: Friday deadline reminder",
            "content": "Hi team,\n\nA quick reminder that our deadline is this Friday.",
            "meta": {"subject": "Friday deadline reminder"}
        }]
    }"#;

    fn gmail_only() -> Vec<Connection> {
        catalog()
            .into_iter()
            .filter(|c| c.id == ConnectionId::Gmail)
            .map(|mut c| {
                c.connected = true;
                c
            })
            .collect()
    }

    fn generating(store: Arc<FlakyStore>, notifier: Notifier) -> ConversationController {
        let provider = Arc::new(ScriptedProvider::replying(GMAIL_REPLY));
        let settings = ChatSettings {
            token_delay_ms: 0,
            ..Default::default()
        };
        let client = GenerationClient::new(provider, Some("key".to_string()), None, settings);
        ConversationController::new(store, Arc::new(client), notifier)
    }

    fn drain(rx: &mut broadcast::Receiver<ConversationEvent>) -> Vec<ConversationEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_email_prompt_with_gmail_connected() {
        let store = Arc::new(FlakyStore::new());
        let user = seeded_user(&store, 0).await;
        let controller = generating(store.clone(), Notifier::new());
        let mut rx = controller.subscribe();

        let model_id = controller
            .send_message(PROMPT, Some(&user), &gmail_only())
            .await
            .unwrap();

        let events = drain(&mut rx);
        match (&events[0], &events[1]) {
            (ConversationEvent::Appended(first), ConversationEvent::Appended(second)) => {
                assert_eq!(first.role, Role::User);
                assert_eq!(first.text, PROMPT);
                assert_eq!(second.role, Role::Model);
                assert_eq!(second.id, model_id);
                assert!(second.text.is_empty());
            }
            other => panic!("unexpected leading events: {:?}", other),
        }
        assert!(events[2..]
            .iter()
            .all(|e| !matches!(e, ConversationEvent::Appended(_))));

        let messages = controller.messages();
        assert_eq!(messages.len(), 2);
        let answer = &messages[1];
        assert_eq!(answer.id, model_id);
        assert!(!answer.text.is_empty());
        assert_eq!(answer.actions.len(), 1);
        let action = &answer.actions[0];
        assert_eq!(action.kind, ConnectionId::Gmail);
        assert!(action.label.starts_with("Draft: ") && action.label.len() > "Draft: ".len());
        assert!(!action.subject().is_empty());

        let persisted = store.inner.list_messages(&user.id).await.unwrap();
        assert_eq!(persisted.len(), 2);
        assert_eq!(persisted[0].text, PROMPT);
        assert_eq!(persisted[1].id, answer.id);
        assert_eq!(persisted[1].text, answer.text);
        assert_eq!(persisted[1].actions, answer.actions);
    }

    #[tokio::test]
    async fn test_email_prompt_without_connections() {
        let store = Arc::new(FlakyStore::new());
        let user = seeded_user(&store, 0).await;
        let controller = generating(store, Notifier::new());

        controller.send_message(PROMPT, Some(&user), &[]).await.unwrap();

        let answer = controller.messages().pop().unwrap();
        assert!(!answer.text.is_empty());
        assert!(answer.actions.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_responder_writes_fallback() {
        let store = Arc::new(FlakyStore::new());
        let user = seeded_user(&store, 0).await;
        let notifier = Notifier::new();
        let mut toasts = notifier.subscribe();
        let controller = ConversationController::new(
            store.clone(),
            Arc::new(ScriptedResponder::unreachable()),
            notifier,
        );

        controller.send_message("hello", Some(&user), &[]).await.unwrap();

        let answer = controller.messages().pop().unwrap();
        assert_eq!(answer.text, CONNECTION_FALLBACK);
        assert!(answer.actions.is_empty());

        let mut errors = 0;
        while let Ok(toast) = toasts.try_recv() {
            if toast.kind == ToastKind::Error {
                errors += 1;
            }
        }
        assert_eq!(errors, 1);

        let persisted = store.inner.list_messages(&user.id).await.unwrap();
        assert_eq!(persisted.last().unwrap().text, CONNECTION_FALLBACK);
    }

    #[tokio::test]
    async fn test_signed_out_send_is_ignored() {
        let store = Arc::new(FlakyStore::new());
        let controller = generating(store, Notifier::new());
        assert!(controller.send_message("hi", None, &[]).await.is_none());
        assert!(controller.messages().is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_does_not_block_answer() {
        let store = Arc::new(FlakyStore::new());
        let user = seeded_user(&store, 0).await;
        store.fail_message_writes.store(true, Ordering::SeqCst);
        let notifier = Notifier::new();
        let controller = generating(store.clone(), notifier.clone());

        controller
            .send_message(PROMPT, Some(&user), &gmail_only())
            .await
            .unwrap();

        assert_eq!(controller.messages().len(), 2);
        assert_eq!(controller.messages()[1].actions.len(), 1);
        assert!(notifier.active().is_empty());
        assert!(store.inner.list_messages(&user.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_updates_only_touch_their_own_message() {
        let store = Arc::new(FlakyStore::new());
        let user = seeded_user(&store, 0).await;
        let updates = vec![
            PartialMessage::text("Hel"),
            PartialMessage::text("Hello"),
            PartialMessage::terminal("Hello", Vec::new()),
        ];
        let controller = ConversationController::new(
            store,
            Arc::new(ScriptedResponder::replaying(updates)),
            Notifier::new(),
        );

        let (first, second) = tokio::join!(
            controller.send_message("one", Some(&user), &[]),
            controller.send_message("two", Some(&user), &[]),
        );
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_ne!(first, second);

        let messages = controller.messages();
        assert_eq!(messages.len(), 4);
        let user_texts: Vec<_> = messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.text.as_str())
            .collect();
        assert_eq!(user_texts, vec!["one", "two"]);
        for id in [&first, &second] {
            assert_eq!(controller.find_message(id).unwrap().text, "Hello");
        }
    }

    #[tokio::test]
    async fn test_apply_update_unknown_id_is_noop() {
        let store = Arc::new(FlakyStore::new());
        let controller = generating(store, Notifier::new());
        controller.replace(vec![Message::user("hi")]);
        assert!(controller
            .apply_update("missing", &PartialMessage::text("x"))
            .is_none());
        assert_eq!(controller.messages()[0].text, "hi");
    }
}
