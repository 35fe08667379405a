use serde_json::{json, Value};

use crate::config::APP_NAME;
use crate::models::{Connection, ConnectionId, Message};

/// Everything the model needs besides the user's prompt.
#[derive(Debug, Clone)]
pub struct ActionPrompt {
    pub system_instruction: String,
    pub response_schema: Value,
}

const BASE_INSTRUCTION: &str = "\
- Your primary goal is to provide a helpful text response to the user's prompt.
- Based on the user's prompt and their active application connections, you can also suggest one or more \"actions\" they can take.
- Actions are things like drafting an email, creating a document, or posting a message.
- Only suggest actions for which the user has an active connection.
- If the user's prompt doesn't clearly imply an action, DO NOT suggest any. Just provide a text response.
- Your entire response MUST be in the JSON format defined in the schema.
- The 'text' field in the JSON response should contain your direct, conversational answer to the user's prompt.
- The 'actions' field should be an array of suggested actions, or an empty array if none are appropriate.
- For a 'gmail' action, the label should be like \"Draft: [Email Subject]\". The content should be the email body. The meta object should include the 'subject' and a potential 'to' address if mentioned.
- For a 'gdocs' action, the label should be like \"Create: [Document Title]\". The content should be the document's body. The meta object should include the 'documentTitle'.
- For a 'slack' action, the label should be like \"Post to #[channel]\". The content should be the message to post. The meta object should include the 'channel'.
- Be creative and helpful in the actions you suggest.";

/// Build the instruction and schema for one turn.
///
/// `history` is the conversation including the live prompt as its last entry;
/// that entry is left out of the context block, and at most `history_limit`
/// earlier messages are kept.
pub fn build_action_prompt(
    active_connections: &[Connection],
    history: &[Message],
    history_limit: usize,
) -> ActionPrompt {
    let active: Vec<&Connection> = active_connections
        .iter()
        .filter(|c| c.connected && !c.coming_soon)
        .collect();

    let mut system_instruction = format!(
        "You are {}, an AI assistant that helps users connect their chat conversations to their apps.\n{}",
        APP_NAME, BASE_INSTRUCTION
    );

    if active.is_empty() {
        system_instruction.push_str(
            "\n\nThe user has no apps connected, so you cannot suggest any actions. The 'actions' field MUST be an empty array.",
        );
    } else {
        let names: Vec<&str> = active.iter().map(|c| c.name.as_str()).collect();
        let ids: Vec<&str> = active.iter().map(|c| c.id.as_str()).collect();
        system_instruction.push_str(&format!(
            "\n\nThe user has the following apps connected: {}. Prioritize suggesting actions for these apps if relevant. \
             Only use these action types: {}.",
            names.join(", "),
            ids.join(", ")
        ));
    }

    let context = history_context(history, history_limit);
    if !context.is_empty() {
        system_instruction.push_str("\n\nHere is the recent conversation history for context:\n");
        system_instruction.push_str(&context);
    }

    let kinds: Vec<ConnectionId> = active.iter().map(|c| c.id).collect();

    ActionPrompt {
        system_instruction,
        response_schema: response_schema(&kinds),
    }
}

/// `role: text` lines for everything but the latest message, newest `limit` only.
fn history_context(history: &[Message], limit: usize) -> String {
    let Some((_, earlier)) = history.split_last() else {
        return String::new();
    };
    let earlier: Vec<&Message> = earlier
        .iter()
        .filter(|m| !m.text.trim().is_empty())
        .collect();
    let start = earlier.len().saturating_sub(limit);

    earlier[start..]
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Response schema in the generative API's OpenAPI subset. The action type
/// enum only lists connected integrations; with none connected the array is
/// capped at zero items.
pub fn response_schema(active: &[ConnectionId]) -> Value {
    let type_enum: Vec<&str> = if active.is_empty() {
        ConnectionId::ALL.iter().map(|id| id.as_str()).collect()
    } else {
        active.iter().map(|id| id.as_str()).collect()
    };

    let mut actions = json!({
        "type": "ARRAY",
        "description": "A list of suggested actions based on the prompt and connected apps. Can be empty.",
        "items": {
            "type": "OBJECT",
            "properties": {
                "type": {
                    "type": "STRING",
                    "enum": type_enum,
                    "description": "The type of action, corresponding to a connected app."
                },
                "label": {
                    "type": "STRING",
                    "description": "A short, descriptive label for the action button (e.g., 'Draft: Project Update Email')."
                },
                "content": {
                    "type": "STRING",
                    "description": "The main content for the action (e.g., email body, document content)."
                },
                "meta": {
                    "type": "OBJECT",
                    "description": "Additional metadata for the action.",
                    "properties": {
                        "subject": { "type": "STRING", "description": "Email subject line." },
                        "to": { "type": "STRING", "description": "Email recipient." },
                        "documentTitle": { "type": "STRING", "description": "Title for the Google Doc." },
                        "channel": { "type": "STRING", "description": "Slack channel name (e.g., 'general')." }
                    }
                }
            },
            "required": ["type", "label", "content"]
        }
    });
    if active.is_empty() {
        actions["maxItems"] = json!("0");
    }

    json!({
        "type": "OBJECT",
        "properties": {
            "text": {
                "type": "STRING",
                "description": "Your conversational response to the user's prompt."
            },
            "actions": actions
        },
        "required": ["text", "actions"]
    })
}
