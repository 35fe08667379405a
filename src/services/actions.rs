use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};

use super::notifications::Notifier;
use super::optimistic::{commit_or_revert, Outcome};
use super::session::Session;
use super::store::{RecordStore, StoreError};
use crate::models::{Action, ConnectionId};

/// The editable parameters of an action, shaped by its integration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionForm {
    Gmail {
        to: String,
        subject: String,
        content: String,
    },
    Gdocs {
        document_title: String,
        content: String,
    },
    Slack {
        channel: String,
        content: String,
    },
    /// Plain yes/no confirmation.
    Generic { label: String },
}

impl ActionForm {
    pub fn from_action(action: &Action) -> Self {
        match action.kind {
            ConnectionId::Gmail => ActionForm::Gmail {
                to: action.recipient(),
                subject: action.subject(),
                content: action.content.clone(),
            },
            ConnectionId::Gdocs => ActionForm::Gdocs {
                document_title: action.document_title(),
                content: action.content.clone(),
            },
            ConnectionId::Slack => ActionForm::Slack {
                channel: action.channel(),
                content: action.content.clone(),
            },
            ConnectionId::Instagram => ActionForm::Generic {
                label: action.label.clone(),
            },
        }
    }

    pub fn title(&self) -> String {
        match self {
            ActionForm::Gmail { .. } => "Draft Email".to_string(),
            ActionForm::Gdocs { .. } => "Create Google Doc".to_string(),
            ActionForm::Slack { .. } => "Post to Slack".to_string(),
            ActionForm::Generic { label } => format!("Confirm Action: {}", label),
        }
    }

    pub fn confirm_text(&self) -> &'static str {
        match self {
            ActionForm::Gmail { .. } => "Create Draft",
            ActionForm::Gdocs { .. } => "Create Document",
            ActionForm::Slack { .. } => "Post",
            ActionForm::Generic { .. } => "Confirm",
        }
    }

    /// Editable fields as `(key, value)` pairs, in display order.
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        match self {
            ActionForm::Gmail {
                to,
                subject,
                content,
            } => vec![
                ("to", to.as_str()),
                ("subject", subject.as_str()),
                ("content", content.as_str()),
            ],
            ActionForm::Gdocs {
                document_title,
                content,
            } => vec![
                ("documentTitle", document_title.as_str()),
                ("content", content.as_str()),
            ],
            ActionForm::Slack { channel, content } => {
                vec![("content", content.as_str()), ("channel", channel.as_str())]
            }
            ActionForm::Generic { .. } => Vec::new(),
        }
    }

    /// Overwrite one editable field. Returns false if the form has no such field.
    pub fn set_field(&mut self, key: &str, value: impl Into<String>) -> bool {
        let slot = match (self, key) {
            (ActionForm::Gmail { to, .. }, "to") => to,
            (ActionForm::Gmail { subject, .. }, "subject") => subject,
            (ActionForm::Gdocs { document_title, .. }, "documentTitle") => document_title,
            (ActionForm::Slack { channel, .. }, "channel") => channel,
            (
                ActionForm::Gmail { content, .. }
                | ActionForm::Gdocs { content, .. }
                | ActionForm::Slack { content, .. },
                "content",
            ) => content,
            _ => return false,
        };
        *slot = value.into();
        true
    }

    /// Notification text once the simulated side effect has happened. Empty
    /// key fields fall back to what the assistant proposed.
    pub fn success_message(&self, action: &Action) -> String {
        fn or_proposed(edited: &str, proposed: String) -> String {
            if edited.trim().is_empty() {
                proposed
            } else {
                edited.to_string()
            }
        }

        match self {
            ActionForm::Gmail { subject, .. } => format!(
                "Email draft for \"{}\" created.",
                or_proposed(subject, action.subject())
            ),
            ActionForm::Gdocs { document_title, .. } => format!(
                "Document \"{}\" created.",
                or_proposed(document_title, action.document_title())
            ),
            ActionForm::Slack { channel, .. } => {
                let channel = channel.trim().trim_start_matches('#');
                let channel = if channel.is_empty() { "general" } else { channel };
                format!("Message posted to #{} in Slack.", channel)
            }
            ActionForm::Generic { label } => {
                format!("Action \"{}\" was successfully simulated.", label)
            }
        }
    }
}

/// A confirmation currently awaiting the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationRequest {
    pub id: String,
    pub action: Action,
    pub form: ActionForm,
}

/// Hosts the single on-screen confirmation. A new request replaces the
/// visible one, and the replaced caller sees a cancellation.
pub struct ConfirmationHost {
    pending: Mutex<Option<(String, oneshot::Sender<ActionForm>)>>,
    current: watch::Sender<Option<ConfirmationRequest>>,
}

impl ConfirmationHost {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            pending: Mutex::new(None),
            current,
        }
    }

    /// Show `form` and wait for the outcome: the edited form on confirm,
    /// `None` on cancel or replacement.
    pub async fn request(&self, action: &Action, form: ActionForm) -> Option<ActionForm> {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();

        let replaced = self.pending.lock().replace((id.clone(), tx));
        if let Some((old_id, old_tx)) = replaced {
            // The replaced caller resolves as cancelled.
            drop(old_tx);
            tracing::debug!(replaced = %old_id, "Replacing open confirmation");
        }
        self.current.send_replace(Some(ConfirmationRequest {
            id: id.clone(),
            action: action.clone(),
            form,
        }));

        let decision = rx.await.ok();

        self.current.send_if_modified(|current| {
            if current.as_ref().is_some_and(|r| r.id == id) {
                *current = None;
                true
            } else {
                false
            }
        });
        decision
    }

    /// Resolve the open confirmation with the user's edits.
    pub fn confirm(&self, edited: ActionForm) -> bool {
        let Some((_, tx)) = self.pending.lock().take() else {
            return false;
        };
        self.current.send_replace(None);
        tx.send(edited).is_ok()
    }

    /// Edit the visible form in place. Returns what `edit` returned, or false
    /// when nothing is open.
    pub fn edit(&self, edit: impl FnOnce(&mut ActionForm) -> bool) -> bool {
        let mut changed = false;
        self.current.send_if_modified(|current| {
            if let Some(request) = current.as_mut() {
                changed = edit(&mut request.form);
            }
            changed
        });
        changed
    }

    pub fn cancel(&self) -> bool {
        let taken = self.pending.lock().take();
        self.current.send_replace(None);
        taken.is_some()
    }

    pub fn current(&self) -> Option<ConfirmationRequest> {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ConfirmationRequest>> {
        self.current.subscribe()
    }
}

impl Default for ConfirmationHost {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed { actions_used: u32 },
    Cancelled,
    QuotaExceeded,
    NotSignedIn,
    /// The usage counter could not be saved; nothing was simulated.
    Failed,
}

const QUOTA_MESSAGE: &str = "You've reached your action limit. Upgrade to Pro for unlimited actions.";

pub struct ActionExecutor {
    store: Arc<dyn RecordStore>,
    session: Arc<Session>,
    notifier: Notifier,
    confirmations: Arc<ConfirmationHost>,
}

impl ActionExecutor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        session: Arc<Session>,
        notifier: Notifier,
        confirmations: Arc<ConfirmationHost>,
    ) -> Self {
        Self {
            store,
            session,
            notifier,
            confirmations,
        }
    }

    pub fn confirmations(&self) -> Arc<ConfirmationHost> {
        self.confirmations.clone()
    }

    pub async fn execute(&self, action: &Action) -> ExecutionOutcome {
        let Some(user) = self.session.current_user() else {
            return ExecutionOutcome::NotSignedIn;
        };
        if user.quota_exhausted() {
            tracing::info!(user_id = %user.id, "Action refused, quota exhausted");
            self.notifier.error(QUOTA_MESSAGE);
            return ExecutionOutcome::QuotaExceeded;
        }

        let form = ActionForm::from_action(action);
        let Some(edited) = self.confirmations.request(action, form).await else {
            tracing::debug!(action = %action.label, "Action cancelled");
            return ExecutionOutcome::Cancelled;
        };

        let outcome: Outcome<u32, StoreError> = commit_or_revert(
            &self.session.user,
            |current| {
                let user = current.as_mut().filter(|u| u.id == user.id)?;
                if user.quota_exhausted() {
                    return None;
                }
                user.actions_used += 1;
                Some(user.actions_used)
            },
            |actions_used| {
                let store = self.store.clone();
                let user_id = user.id.clone();
                async move {
                    store
                        .update_actions_used(&user_id, actions_used)
                        .await
                        .map(|_| actions_used)
                }
            },
            |current, actions_used| {
                if let Some(u) = current.as_mut().filter(|u| u.id == user.id) {
                    if u.actions_used == actions_used {
                        u.actions_used -= 1;
                    }
                }
            },
        )
        .await;

        match outcome {
            Outcome::Committed(actions_used) => {
                tracing::info!(kind = action.kind.as_str(), actions_used, "Action simulated");
                self.notifier.success(edited.success_message(action));
                ExecutionOutcome::Completed { actions_used }
            }
            Outcome::Skipped => {
                self.notifier.error(QUOTA_MESSAGE);
                ExecutionOutcome::QuotaExceeded
            }
            Outcome::Reverted(e) => {
                tracing::error!("Failed to record action usage: {}", e);
                self.notifier
                    .error("Could not record this action. Please try again.");
                ExecutionOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::models::{ActionMeta, ToastKind, User};
    use crate::testing::{seeded_user, FlakyStore};

    fn gmail_action() -> Action {
        Action {
            id: "a1".to_string(),
            kind: ConnectionId::Gmail,
            label: "Draft: Friday deadline".to_string(),
            content: "Hi team".to_string(),
            meta: Some(ActionMeta {
                subject: Some("Friday deadline".to_string()),
                ..Default::default()
            }),
        }
    }

    async fn executor_for(
        store: &Arc<FlakyStore>,
        actions_used: u32,
    ) -> (Arc<ActionExecutor>, Arc<Session>, Notifier, User) {
        let user = seeded_user(store, actions_used).await;
        let session = Arc::new(Session::new());
        *session.user.lock() = Some(user.clone());
        let notifier = Notifier::new();
        let executor = Arc::new(ActionExecutor::new(
            store.clone(),
            session.clone(),
            notifier.clone(),
            Arc::new(ConfirmationHost::new()),
        ));
        (executor, session, notifier, user)
    }

    /// Wait until the executor's confirmation is on screen.
    async fn shown(host: &ConfirmationHost) -> ConfirmationRequest {
        let mut rx = host.subscribe();
        let request = rx.wait_for(|r| r.is_some()).await.unwrap();
        request.clone().unwrap()
    }

    #[tokio::test]
    async fn test_quota_boundary() {
        let store = Arc::new(FlakyStore::new());
        let (executor, session, notifier, user) = executor_for(&store, 9).await;
        let host = executor.confirmations();

        let run = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.execute(&gmail_action()).await })
        };
        let request = shown(&host).await;
        assert_eq!(request.form.title(), "Draft Email");
        assert!(host.confirm(request.form));
        assert_eq!(
            run.await.unwrap(),
            ExecutionOutcome::Completed { actions_used: 10 }
        );
        assert_eq!(session.current_user().unwrap().actions_used, 10);
        assert_eq!(store.inner.get_user(&user.id).await.unwrap().actions_used, 10);
        assert_eq!(
            notifier.active()[0].message,
            "Email draft for \"Friday deadline\" created."
        );

        // refused before any confirmation is shown
        assert_eq!(
            executor.execute(&gmail_action()).await,
            ExecutionOutcome::QuotaExceeded
        );
        assert!(host.current().is_none());
        assert_eq!(session.current_user().unwrap().actions_used, 10);
        let last = notifier.active().pop().unwrap();
        assert_eq!(last.kind, ToastKind::Error);
        assert_eq!(last.message, QUOTA_MESSAGE);
    }

    #[tokio::test]
    async fn test_cancel_changes_nothing() {
        let store = Arc::new(FlakyStore::new());
        let (executor, session, notifier, _) = executor_for(&store, 3).await;
        let host = executor.confirmations();

        let run = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.execute(&gmail_action()).await })
        };
        shown(&host).await;
        assert!(host.cancel());

        assert_eq!(run.await.unwrap(), ExecutionOutcome::Cancelled);
        assert_eq!(session.current_user().unwrap().actions_used, 3);
        assert!(notifier.active().is_empty());
        assert!(host.current().is_none());
    }

    #[tokio::test]
    async fn test_edited_fields_reach_the_notification() {
        let store = Arc::new(FlakyStore::new());
        let (executor, _, notifier, _) = executor_for(&store, 0).await;
        let host = executor.confirmations();
        let action = Action {
            id: "a2".to_string(),
            kind: ConnectionId::Slack,
            label: "Post to #general".to_string(),
            content: "Standup moved".to_string(),
            meta: None,
        };

        let run = {
            let executor = executor.clone();
            let action = action.clone();
            tokio::spawn(async move { executor.execute(&action).await })
        };
        let mut form = shown(&host).await.form;
        assert!(form.set_field("channel", "#eng"));
        assert!(!form.set_field("subject", "nope"));
        host.confirm(form);

        assert!(matches!(
            run.await.unwrap(),
            ExecutionOutcome::Completed { .. }
        ));
        assert_eq!(notifier.active()[0].message, "Message posted to #eng in Slack.");
    }

    #[tokio::test]
    async fn test_second_request_replaces_first() {
        let host = Arc::new(ConfirmationHost::new());
        let first = {
            let host = host.clone();
            tokio::spawn(async move {
                host.request(&gmail_action(), ActionForm::from_action(&gmail_action()))
                    .await
            })
        };
        let first_id = shown(&host).await.id;

        let mut slack = gmail_action();
        slack.kind = ConnectionId::Slack;
        let second = {
            let host = host.clone();
            let slack = slack.clone();
            tokio::spawn(async move { host.request(&slack, ActionForm::from_action(&slack)).await })
        };

        assert_eq!(first.await.unwrap(), None);
        let mut rx = host.subscribe();
        let visible = rx
            .wait_for(|r| r.as_ref().is_some_and(|r| r.id != first_id))
            .await
            .unwrap()
            .clone()
            .unwrap();
        assert_eq!(visible.action.kind, ConnectionId::Slack);

        host.confirm(visible.form.clone());
        assert_eq!(second.await.unwrap(), Some(visible.form));
        assert!(host.current().is_none());
    }

    #[tokio::test]
    async fn test_edit_updates_visible_form() {
        let host = Arc::new(ConfirmationHost::new());
        assert!(!host.edit(|form| form.set_field("subject", "x")));

        let pending = {
            let host = host.clone();
            tokio::spawn(async move {
                host.request(&gmail_action(), ActionForm::from_action(&gmail_action()))
                    .await
            })
        };
        shown(&host).await;
        assert!(host.edit(|form| form.set_field("subject", "Moved to Monday")));
        assert!(!host.edit(|form| form.set_field("channel", "x")));

        let form = host.current().unwrap().form;
        assert_eq!(form.fields()[1], ("subject", "Moved to Monday"));
        host.confirm(form.clone());
        assert_eq!(pending.await.unwrap(), Some(form));
    }

    #[tokio::test]
    async fn test_failed_counter_write_reverts() {
        let store = Arc::new(FlakyStore::new());
        let (executor, session, notifier, _) = executor_for(&store, 4).await;
        store.fail_user_writes.store(true, Ordering::SeqCst);
        let host = executor.confirmations();

        let run = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.execute(&gmail_action()).await })
        };
        let request = shown(&host).await;
        host.confirm(request.form);

        assert_eq!(run.await.unwrap(), ExecutionOutcome::Failed);
        assert_eq!(session.current_user().unwrap().actions_used, 4);
        let toasts = notifier.active();
        assert_eq!(toasts.len(), 1);
        assert_eq!(toasts[0].kind, ToastKind::Error);
    }

    #[tokio::test]
    async fn test_signed_out_cannot_execute() {
        let executor = ActionExecutor::new(
            Arc::new(FlakyStore::new()),
            Arc::new(Session::new()),
            Notifier::new(),
            Arc::new(ConfirmationHost::new()),
        );
        let outcome = tokio::time::timeout(Duration::from_secs(1), executor.execute(&gmail_action()))
            .await
            .unwrap();
        assert_eq!(outcome, ExecutionOutcome::NotSignedIn);
    }

    #[test]
    fn test_success_messages() {
        let generic = Action {
            id: "a3".to_string(),
            kind: ConnectionId::Instagram,
            label: "Schedule post".to_string(),
            content: String::new(),
            meta: None,
        };
        let form = ActionForm::from_action(&generic);
        assert!(form.fields().is_empty());
        assert_eq!(form.title(), "Confirm Action: Schedule post");
        assert_eq!(
            form.success_message(&generic),
            "Action \"Schedule post\" was successfully simulated."
        );

        let slack = ActionForm::Slack {
            channel: String::new(),
            content: "hi".to_string(),
        };
        assert_eq!(
            slack.success_message(&generic),
            "Message posted to #general in Slack."
        );

        let gdocs = Action {
            kind: ConnectionId::Gdocs,
            meta: Some(ActionMeta {
                document_title: Some("Q3 Plan".to_string()),
                ..Default::default()
            }),
            ..generic.clone()
        };
        let mut form = ActionForm::from_action(&gdocs);
        form.set_field("documentTitle", "  ");
        assert_eq!(form.success_message(&gdocs), "Document \"Q3 Plan\" created.");
    }
}
