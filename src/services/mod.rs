pub mod actions;
pub mod billing;
pub mod connections;
pub mod conversation;
pub mod database;
pub mod generation;
pub mod notifications;
pub mod optimistic;
pub mod prompt;
pub mod session;
pub mod settings;
pub mod store;

pub use actions::{ActionExecutor, ConfirmationHost};
pub use billing::BillingService;
pub use connections::ConnectionService;
pub use conversation::ConversationController;
pub use database::Database;
pub use generation::GenerationClient;
pub use notifications::Notifier;
pub use session::{Session, SessionService};
pub use settings::SettingsService;
