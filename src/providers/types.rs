use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Rate limited: retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),
}

#[derive(Clone)]
pub struct StructuredRequest {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
    pub system_instruction: String,
    pub prompt: String,
    pub response_schema: serde_json::Value,
    pub temperature: Option<f32>,
}

impl std::fmt::Debug for StructuredRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StructuredRequest")
            .field("api_key", &"***")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field(
                "system_instruction",
                &format!("[{} chars]", self.system_instruction.len()),
            )
            .field("prompt", &self.prompt)
            .field("temperature", &self.temperature)
            .finish()
    }
}
