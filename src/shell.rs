use std::collections::HashMap;

use tokio::sync::broadcast::{self, error::RecvError};

use crate::config::APP_NAME;
use crate::models::{Message, Role};
use crate::services::conversation::ConversationEvent;

/// Next event from a feed, or `None` once the sender is gone. A receiver that
/// fell behind skips what it missed and keeps going.
pub async fn next_event<T: Clone>(rx: &mut broadcast::Receiver<T>, feed: &str) -> Option<T> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(feed, skipped, "Terminal fell behind");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

/// Turns conversation events into terminal output. Answers are printed
/// incrementally; every update carries the full text, so missed events only
/// cost a catch-up.
#[derive(Default)]
pub struct Transcript {
    /// Bytes of each streaming answer already written.
    printed: HashMap<String, usize>,
}

impl Transcript {
    pub fn render(
        &mut self,
        event: &ConversationEvent,
        find: impl FnOnce(&str) -> Option<Message>,
    ) -> String {
        match event {
            ConversationEvent::Appended(message) | ConversationEvent::Updated(message)
                if message.role == Role::Model =>
            {
                self.catch_up(message)
            }
            ConversationEvent::Finished(id) => {
                let mut out = match self.printed.remove(id) {
                    Some(_) => "\n".to_string(),
                    None => String::new(),
                };
                if let Some(message) = find(id) {
                    for (i, action) in message.actions.iter().enumerate() {
                        out.push_str(&format!("  [{}] {}\n", i + 1, action.label));
                    }
                }
                out
            }
            ConversationEvent::Reset => {
                self.printed.clear();
                String::new()
            }
            _ => String::new(),
        }
    }

    fn catch_up(&mut self, message: &Message) -> String {
        let Some(len) = self.printed.get_mut(&message.id) else {
            self.printed.insert(message.id.clone(), message.text.len());
            return format!("{}: {}", APP_NAME, message.text);
        };
        match message.text.get(*len..) {
            Some(delta) => {
                *len = message.text.len();
                delta.to_string()
            }
            // Text was replaced rather than extended.
            None => {
                *len = message.text.len();
                format!("\n{}: {}", APP_NAME, message.text)
            }
        }
    }
}
