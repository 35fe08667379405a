use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::Action;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "model" => Some(Role::Model),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub text: String,
    #[serde(default)]
    pub actions: Vec<Action>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            text: text.into(),
            actions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// The empty assistant turn that streamed updates are written into.
    pub fn placeholder() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Model,
            text: String::new(),
            actions: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Last write wins per field; fields absent from the update are kept.
    pub fn apply(&mut self, update: &PartialMessage) {
        if let Some(text) = &update.text {
            self.text.clone_from(text);
        }
        if let Some(actions) = &update.actions {
            self.actions.clone_from(actions);
        }
    }
}

/// One step of a streamed answer. `text` is cumulative, and `actions` is only
/// carried by the terminal update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialMessage {
    pub text: Option<String>,
    pub actions: Option<Vec<Action>>,
}

impl PartialMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            actions: None,
        }
    }

    pub fn terminal(text: impl Into<String>, actions: Vec<Action>) -> Self {
        Self {
            text: Some(text.into()),
            actions: Some(actions),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.actions.is_some()
    }
}
