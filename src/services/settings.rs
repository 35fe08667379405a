use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::database::Database;
use crate::config::DEFAULT_MODEL;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSettings {
    pub model: String,
    pub temperature: Option<f32>,
    /// Pause between simulated tokens while replaying an answer.
    pub token_delay_ms: u64,
    /// How many earlier messages are given to the model as context.
    pub history_limit: usize,
    pub request_timeout_secs: u64,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
            token_delay_ms: 30,
            history_limit: 20,
            request_timeout_secs: 60,
        }
    }
}

impl ChatSettings {
    pub fn token_delay(&self) -> Duration {
        Duration::from_millis(self.token_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

pub struct SettingsService;

impl SettingsService {
    const KEY: &'static str = "chat_settings";

    pub async fn load(db: &Database) -> ChatSettings {
        match db.get_setting(Self::KEY).await {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("Ignoring corrupt chat settings: {}", e);
                ChatSettings::default()
            }),
            Ok(None) => ChatSettings::default(),
            Err(e) => {
                tracing::error!("Failed to load chat settings: {}", e);
                ChatSettings::default()
            }
        }
    }

    pub async fn save(db: &Database, settings: &ChatSettings) -> Result<()> {
        let json = serde_json::to_string(settings)?;
        db.set_setting(Self::KEY, &json).await
    }
}
