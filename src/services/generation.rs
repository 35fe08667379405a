use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Deserialize;
use thiserror::Error;

use super::prompt::build_action_prompt;
use super::settings::ChatSettings;
use crate::config::GENERATION_APOLOGY;
use crate::models::{Action, ActionMeta, Connection, ConnectionId, Message, PartialMessage};
use crate::providers::{AiProvider, ProviderError, StructuredRequest};

pub type UpdateStream = BoxStream<'static, PartialMessage>;

/// The responder could not produce a stream at all.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Could not reach the assistant: {0}")]
    Transport(String),
}

/// Source of streamed assistant turns for the conversation.
#[async_trait]
pub trait ChatResponder: Send + Sync {
    async fn respond(
        &self,
        prompt: &str,
        active_connections: &[Connection],
        history: &[Message],
    ) -> Result<UpdateStream, GenerationError>;
}

#[derive(Debug, Error)]
enum ReplyError {
    #[error("no Gemini API key configured")]
    MissingApiKey,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("malformed structured response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Only the envelope is strict. Each action is checked on its own so one
/// unusable entry does not cost the whole answer.
#[derive(Debug, Deserialize)]
struct ModelReply {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    actions: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct ProposedAction {
    #[serde(rename = "type")]
    kind: ConnectionId,
    label: String,
    content: String,
    #[serde(default)]
    meta: Option<ActionMeta>,
}

struct ParsedReply {
    text: String,
    actions: Vec<Action>,
}

/// Turns one structured model call into a stream of growing partial messages.
pub struct GenerationClient {
    provider: Arc<dyn AiProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    settings: ChatSettings,
}

impl GenerationClient {
    pub fn new(
        provider: Arc<dyn AiProvider>,
        api_key: Option<String>,
        base_url: Option<String>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            provider,
            api_key,
            base_url,
            settings,
        }
    }

    /// Never fails: a model or parse error becomes a single apology update.
    pub fn generate(
        &self,
        prompt: &str,
        active_connections: &[Connection],
        history: &[Message],
    ) -> UpdateStream {
        let built = build_action_prompt(active_connections, history, self.settings.history_limit);
        let allowed: HashSet<ConnectionId> = active_connections
            .iter()
            .filter(|c| c.connected && !c.coming_soon)
            .map(|c| c.id)
            .collect();

        let request = self.api_key.clone().map(|api_key| StructuredRequest {
            api_key,
            model: self.settings.model.clone(),
            base_url: self.base_url.clone(),
            system_instruction: built.system_instruction,
            prompt: prompt.to_string(),
            response_schema: built.response_schema,
            temperature: self.settings.temperature,
        });
        let provider = self.provider.clone();
        let timeout = self.settings.request_timeout();
        let delay = self.settings.token_delay();

        Box::pin(async_stream::stream! {
            let outcome = match request {
                Some(request) => {
                    tracing::debug!(provider = provider.name(), ?request, "Requesting structured reply");
                    match tokio::time::timeout(timeout, provider.generate_structured(request)).await {
                        Ok(Ok(raw)) => parse_reply(&raw, &allowed),
                        Ok(Err(e)) => Err(ReplyError::Provider(e)),
                        Err(_) => Err(ReplyError::Provider(ProviderError::Timeout(timeout.as_secs()))),
                    }
                }
                None => Err(ReplyError::MissingApiKey),
            };

            match outcome {
                Ok(reply) => {
                    let mut streamed = String::new();
                    for token in split_preserving_whitespace(&reply.text) {
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        streamed.push_str(token);
                        yield PartialMessage::text(streamed.clone());
                    }
                    yield PartialMessage::terminal(reply.text, reply.actions);
                }
                Err(e) => {
                    tracing::error!("Error generating chat response: {}", e);
                    yield PartialMessage::terminal(GENERATION_APOLOGY, Vec::new());
                }
            }
        })
    }
}

#[async_trait]
impl ChatResponder for GenerationClient {
    async fn respond(
        &self,
        prompt: &str,
        active_connections: &[Connection],
        history: &[Message],
    ) -> Result<UpdateStream, GenerationError> {
        Ok(self.generate(prompt, active_connections, history))
    }
}

/// Parse the model's JSON, give every usable action a fresh id, and drop
/// entries that are malformed or target an integration that is not connected.
fn parse_reply(raw: &str, allowed: &HashSet<ConnectionId>) -> Result<ParsedReply, ReplyError> {
    let reply: ModelReply = serde_json::from_str(raw.trim())?;
    let proposed = reply.actions.unwrap_or_default();
    let proposed_count = proposed.len();

    let actions: Vec<Action> = proposed
        .into_iter()
        .filter_map(|value| match serde_json::from_value::<ProposedAction>(value) {
            Ok(action) => Some(action),
            Err(e) => {
                tracing::warn!("Ignoring malformed action: {}", e);
                None
            }
        })
        .filter(|a| allowed.contains(&a.kind))
        .map(|a| Action {
            id: uuid::Uuid::new_v4().to_string(),
            kind: a.kind,
            label: a.label,
            content: a.content,
            meta: a.meta,
        })
        .collect();

    if actions.len() < proposed_count {
        tracing::warn!(
            dropped = proposed_count - actions.len(),
            "Discarded actions the user cannot run"
        );
    }

    Ok(ParsedReply {
        text: reply.text.unwrap_or_default(),
        actions,
    })
}

/// Split on whitespace boundaries, keeping the whitespace runs as their own
/// tokens so the pieces concatenate back to the input.
pub fn split_preserving_whitespace(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = 0;
    let mut in_space: Option<bool> = None;

    for (i, ch) in text.char_indices() {
        let is_space = ch.is_whitespace();
        if in_space.is_some_and(|prev| prev != is_space) {
            tokens.push(&text[start..i]);
            start = i;
        }
        in_space = Some(is_space);
    }
    if start < text.len() {
        tokens.push(&text[start..]);
    }
    tokens
}
