use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::models::{ToastKind, ToastMessage};

/// How long a toast stays on screen, including its exit animation.
pub const TOAST_LIFETIME: Duration = Duration::from_millis(4_000 + 300);

/// Handle for raising user-visible notifications. Cheap to clone; every
/// component that needs to tell the user something gets one.
#[derive(Clone)]
pub struct Notifier {
    active: Arc<Mutex<Vec<ToastMessage>>>,
    events: broadcast::Sender<ToastMessage>,
    lifetime: Duration,
}

impl Notifier {
    pub fn new() -> Self {
        Self::with_lifetime(TOAST_LIFETIME)
    }

    pub fn with_lifetime(lifetime: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            active: Arc::new(Mutex::new(Vec::new())),
            events,
            lifetime,
        }
    }

    pub fn success(&self, message: impl Into<String>) -> String {
        self.push(message.into(), ToastKind::Success)
    }

    pub fn error(&self, message: impl Into<String>) -> String {
        self.push(message.into(), ToastKind::Error)
    }

    /// Toasts currently on screen, oldest first.
    pub fn active(&self) -> Vec<ToastMessage> {
        self.active.lock().clone()
    }

    pub fn dismiss(&self, id: &str) {
        self.active.lock().retain(|t| t.id != id);
    }

    /// Every toast raised from now on, including ones that expire before the
    /// receiver looks at `active`.
    pub fn subscribe(&self) -> broadcast::Receiver<ToastMessage> {
        self.events.subscribe()
    }

    fn push(&self, message: String, kind: ToastKind) -> String {
        let toast = ToastMessage {
            id: uuid::Uuid::new_v4().to_string(),
            message,
            kind,
        };
        match kind {
            ToastKind::Success => tracing::info!(toast = %toast.message, "Notification"),
            ToastKind::Error => tracing::warn!(toast = %toast.message, "Error notification"),
        }

        let id = toast.id.clone();
        self.active.lock().push(toast.clone());
        let _ = self.events.send(toast);
        self.schedule_expiry(id.clone());
        id
    }

    fn schedule_expiry(&self, id: String) {
        // Outside a runtime the toast simply stays until dismissed.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let notifier = self.clone();
        handle.spawn(async move {
            tokio::time::sleep(notifier.lifetime).await;
            notifier.dismiss(&id);
        });
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
