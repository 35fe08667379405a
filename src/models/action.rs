use serde::{Deserialize, Serialize};

use super::connection::ConnectionId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

/// A suggestion attached to a model message. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ConnectionId,
    pub label: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ActionMeta>,
}

impl Action {
    fn meta_field(&self, pick: impl Fn(&ActionMeta) -> Option<&String>) -> String {
        self.meta
            .as_ref()
            .and_then(pick)
            .cloned()
            .unwrap_or_default()
    }

    pub fn subject(&self) -> String {
        self.meta_field(|m| m.subject.as_ref())
    }

    pub fn recipient(&self) -> String {
        self.meta_field(|m| m.to.as_ref())
    }

    pub fn document_title(&self) -> String {
        self.meta_field(|m| m.document_title.as_ref())
    }

    pub fn channel(&self) -> String {
        self.meta_field(|m| m.channel.as_ref())
    }
}
