use async_trait::async_trait;

use super::types::{ProviderError, StructuredRequest};

/// A generative model that answers with JSON constrained by a response schema.
#[async_trait]
pub trait AiProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// One request, one response. Returns the raw text the model produced,
    /// which is expected (but not guaranteed) to parse as the schema.
    async fn generate_structured(&self, request: StructuredRequest)
        -> Result<String, ProviderError>;
}
