use std::path::PathBuf;

pub const APP_NAME: &str = "FlowLink";

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// Shown in place of the model's answer when the structured call fails.
pub const GENERATION_APOLOGY: &str = "I'm sorry, I encountered an error. Please try again.";

/// Written into the placeholder when the responder cannot produce a stream at all.
pub const CONNECTION_FALLBACK: &str = "I'm having trouble connecting. Please try again.";

pub const FREE_ACTIONS_LIMIT: u32 = 10;

/// Runtime configuration sourced from the environment.
#[derive(Clone, Default)]
pub struct AppConfig {
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: Option<String>,
    pub db_path: Option<PathBuf>,
    pub stripe_publishable_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            gemini_api_key: non_empty_var("GEMINI_API_KEY").or_else(|| non_empty_var("API_KEY")),
            gemini_base_url: non_empty_var("FLOWLINK_GEMINI_BASE_URL"),
            db_path: non_empty_var("FLOWLINK_DB_PATH").map(PathBuf::from),
            stripe_publishable_key: non_empty_var("STRIPE_PUBLISHABLE_KEY"),
        }
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("gemini_api_key", &self.gemini_api_key.as_ref().map(|_| "***"))
            .field("gemini_base_url", &self.gemini_base_url)
            .field("db_path", &self.db_path)
            .field("stripe_publishable_key", &self.stripe_publishable_key)
            .finish()
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
