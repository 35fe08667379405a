pub mod action;
pub mod connection;
pub mod message;
pub mod toast;
pub mod user;

pub use action::{Action, ActionMeta};
pub use connection::{Connection, ConnectionId, ConnectionRow};
pub use message::{Message, PartialMessage, Role};
pub use toast::{ToastKind, ToastMessage};
pub use user::{Identity, Tier, User};
