use serde::{Deserialize, Serialize};

/// The fixed set of integrations a user can connect. Also the `type` of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionId {
    Gmail,
    Gdocs,
    Slack,
    Instagram,
}

impl ConnectionId {
    pub const ALL: [ConnectionId; 4] = [
        ConnectionId::Gmail,
        ConnectionId::Gdocs,
        ConnectionId::Slack,
        ConnectionId::Instagram,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionId::Gmail => "gmail",
            ConnectionId::Gdocs => "gdocs",
            ConnectionId::Slack => "slack",
            ConnectionId::Instagram => "instagram",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "gmail" => Some(ConnectionId::Gmail),
            "gdocs" => Some(ConnectionId::Gdocs),
            "slack" => Some(ConnectionId::Slack),
            "instagram" => Some(ConnectionId::Instagram),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: ConnectionId,
    pub name: String,
    pub description: String,
    pub connected: bool,
    #[serde(default)]
    pub coming_soon: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
}

/// Per-user persisted state of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRow {
    pub user_id: String,
    pub platform: ConnectionId,
    pub connected: bool,
    pub team_name: Option<String>,
}

/// The catalog every session starts from before persisted rows are overlaid.
pub fn catalog() -> Vec<Connection> {
    vec![
        Connection {
            id: ConnectionId::Gmail,
            name: "Gmail".to_string(),
            description: "Draft emails directly from AI conversations.".to_string(),
            connected: false,
            coming_soon: false,
            team_name: None,
        },
        Connection {
            id: ConnectionId::Gdocs,
            name: "Google Docs".to_string(),
            description: "Save content directly to Google Docs.".to_string(),
            connected: false,
            coming_soon: false,
            team_name: None,
        },
        Connection {
            id: ConnectionId::Slack,
            name: "Slack".to_string(),
            description: "Post messages to your Slack channels.".to_string(),
            connected: false,
            coming_soon: false,
            team_name: Some("ACME Inc.".to_string()),
        },
        Connection {
            id: ConnectionId::Instagram,
            name: "Instagram".to_string(),
            description: "Draft and schedule social media posts.".to_string(),
            connected: false,
            coming_soon: true,
            team_name: None,
        },
    ]
}

/// Apply persisted rows on top of the catalog. A coming-soon entry never
/// becomes connected, whatever the store says.
pub fn overlay(mut connections: Vec<Connection>, rows: &[ConnectionRow]) -> Vec<Connection> {
    for conn in &mut connections {
        if let Some(row) = rows.iter().find(|r| r.platform == conn.id) {
            conn.connected = row.connected && !conn.coming_soon;
            if row.team_name.is_some() {
                conn.team_name = row.team_name.clone();
            }
        }
    }
    connections
}
