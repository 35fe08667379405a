use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::AppConfig;
use crate::models::{Action, ConnectionId, Identity, User};
use crate::providers::gemini::GeminiProvider;
use crate::services::actions::ExecutionOutcome;
use crate::services::billing::UpgradeOutcome;
use crate::services::generation::ChatResponder;
use crate::services::store::RecordStore;
use crate::services::{
    ActionExecutor, BillingService, ConfirmationHost, ConnectionService, ConversationController,
    Database, GenerationClient, Notifier, Session, SessionService, SettingsService,
};

#[derive(Debug)]
pub enum AppMsg {
    SignIn(Identity),
    SignOut,
    SendMessage(String),
    ToggleConnection(ConnectionId),
    /// Run the action with this id from the current conversation.
    RunAction(String),
    Upgrade,
}

#[derive(Debug)]
pub enum AppOutput {
    SignedIn(Option<User>),
    SignedOut,
    Replied(Option<String>),
    Toggled(Option<bool>),
    ActionFinished(Option<ExecutionOutcome>),
    Upgrade(UpgradeOutcome),
}

pub struct App {
    session: Arc<Session>,
    notifier: Notifier,
    conversation: Arc<ConversationController>,
    confirmations: Arc<ConfirmationHost>,
    sessions: SessionService,
    connections: ConnectionService,
    executor: ActionExecutor,
    billing: BillingService,
}

impl App {
    /// Open the database, load chat settings and wire up the Gemini backend.
    pub async fn init(config: &AppConfig) -> Result<Self> {
        let db = Database::new(config.db_path.as_deref())
            .await
            .context("Failed to open database")?;
        let settings = SettingsService::load(&db).await;
        tracing::debug!(?settings, "Loaded chat settings");
        // Write back so newly added fields show up with their defaults.
        if let Err(e) = SettingsService::save(&db, &settings).await {
            tracing::error!("Failed to save settings: {}", e);
        }

        if config.gemini_api_key.is_none() {
            tracing::warn!("GEMINI_API_KEY is not set; replies will fail");
        }
        let client = GenerationClient::new(
            Arc::new(GeminiProvider::new()),
            config.gemini_api_key.clone(),
            config.gemini_base_url.clone(),
            settings,
        );

        Ok(Self::with_parts(
            Arc::new(db),
            Arc::new(client),
            config.stripe_publishable_key.clone(),
        ))
    }

    pub fn with_parts(
        store: Arc<dyn RecordStore>,
        responder: Arc<dyn ChatResponder>,
        stripe_publishable_key: Option<String>,
    ) -> Self {
        let notifier = Notifier::new();
        let session = Arc::new(Session::new());
        let confirmations = Arc::new(ConfirmationHost::new());
        let conversation = Arc::new(ConversationController::new(
            store.clone(),
            responder,
            notifier.clone(),
        ));

        Self {
            sessions: SessionService::new(
                store.clone(),
                session.clone(),
                conversation.clone(),
                notifier.clone(),
            ),
            connections: ConnectionService::new(store.clone(), session.clone(), notifier.clone()),
            executor: ActionExecutor::new(
                store,
                session.clone(),
                notifier.clone(),
                confirmations.clone(),
            ),
            billing: BillingService::new(stripe_publishable_key, notifier.clone()),
            session,
            notifier,
            conversation,
            confirmations,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn conversation(&self) -> &Arc<ConversationController> {
        &self.conversation
    }

    pub fn confirmations(&self) -> &Arc<ConfirmationHost> {
        &self.confirmations
    }

    pub async fn update(&self, msg: AppMsg) -> AppOutput {
        match msg {
            AppMsg::SignIn(identity) => AppOutput::SignedIn(self.sessions.sign_in(&identity).await),
            AppMsg::SignOut => {
                self.confirmations.cancel();
                self.sessions.sign_out();
                AppOutput::SignedOut
            }
            AppMsg::SendMessage(text) => {
                let text = text.trim();
                if text.is_empty() {
                    return AppOutput::Replied(None);
                }
                let user = self.session.current_user();
                let active = self.session.active_connections();
                AppOutput::Replied(
                    self.conversation
                        .send_message(text, user.as_ref(), &active)
                        .await,
                )
            }
            AppMsg::ToggleConnection(id) => AppOutput::Toggled(self.connections.toggle(id).await),
            AppMsg::RunAction(action_id) => match self.find_action(&action_id) {
                Some(action) => {
                    AppOutput::ActionFinished(Some(self.executor.execute(&action).await))
                }
                None => {
                    tracing::warn!(action_id = %action_id, "No such action in the conversation");
                    AppOutput::ActionFinished(None)
                }
            },
            AppMsg::Upgrade => AppOutput::Upgrade(self.billing.upgrade()),
        }
    }

    fn find_action(&self, id: &str) -> Option<Action> {
        self.conversation
            .messages()
            .into_iter()
            .flat_map(|m| m.actions)
            .find(|a| a.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionMeta, PartialMessage};
    use crate::testing::{FlakyStore, ScriptedResponder};

    fn identity() -> Identity {
        Identity {
            id: "u-app".to_string(),
            email: "lin@example.com".to_string(),
            name: Some("Lin".to_string()),
            avatar_url: None,
        }
    }

    fn doc_reply() -> Vec<PartialMessage> {
        let action = Action {
            id: "act-1".to_string(),
            kind: ConnectionId::Gdocs,
            label: "Create: Meeting notes".to_string(),
            content: "Notes".to_string(),
            meta: Some(ActionMeta {
                document_title: Some("Meeting notes".to_string()),
                ..Default::default()
            }),
        };
        vec![
            PartialMessage::text("Here you go."),
            PartialMessage::terminal("Here you go.", vec![action]),
        ]
    }

    #[tokio::test]
    async fn test_chat_to_action_flow() {
        let app = Arc::new(App::with_parts(
            Arc::new(FlakyStore::new()),
            Arc::new(ScriptedResponder::replaying(doc_reply())),
            None,
        ));

        let AppOutput::SignedIn(Some(user)) = app.update(AppMsg::SignIn(identity())).await else {
            panic!("sign in failed");
        };
        assert_eq!(user.actions_used, 0);

        let toggled = app.update(AppMsg::ToggleConnection(ConnectionId::Gdocs)).await;
        assert!(matches!(toggled, AppOutput::Toggled(Some(true))));

        let replied = app
            .update(AppMsg::SendMessage("write up the meeting".to_string()))
            .await;
        assert!(matches!(replied, AppOutput::Replied(Some(_))));

        let run = {
            let app = app.clone();
            tokio::spawn(async move { app.update(AppMsg::RunAction("act-1".to_string())).await })
        };
        let mut rx = app.confirmations().subscribe();
        let request = rx.wait_for(|r| r.is_some()).await.unwrap().clone().unwrap();
        assert_eq!(request.form.title(), "Create Google Doc");
        app.confirmations().confirm(request.form);

        assert!(matches!(
            run.await.unwrap(),
            AppOutput::ActionFinished(Some(ExecutionOutcome::Completed { actions_used: 1 }))
        ));
        let messages: Vec<_> = app
            .notifier()
            .active()
            .into_iter()
            .map(|t| t.message)
            .collect();
        assert!(messages.contains(&"Document \"Meeting notes\" created.".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_action_and_blank_message() {
        let app = App::with_parts(
            Arc::new(FlakyStore::new()),
            Arc::new(ScriptedResponder::replaying(doc_reply())),
            None,
        );
        app.update(AppMsg::SignIn(identity())).await;

        assert!(matches!(
            app.update(AppMsg::SendMessage("   ".to_string())).await,
            AppOutput::Replied(None)
        ));
        assert!(app.conversation().messages().is_empty());
        assert!(matches!(
            app.update(AppMsg::RunAction("missing".to_string())).await,
            AppOutput::ActionFinished(None)
        ));
    }

    #[tokio::test]
    async fn test_sign_out_clears_session() {
        let app = App::with_parts(
            Arc::new(FlakyStore::new()),
            Arc::new(ScriptedResponder::replaying(doc_reply())),
            Some("pk_test".to_string()),
        );
        app.update(AppMsg::SignIn(identity())).await;
        app.update(AppMsg::SendMessage("hello".to_string())).await;
        assert_eq!(app.conversation().messages().len(), 2);

        app.update(AppMsg::SignOut).await;
        assert!(app.session().current_user().is_none());
        assert!(app.conversation().messages().is_empty());
        assert!(matches!(
            app.update(AppMsg::Upgrade).await,
            AppOutput::Upgrade(UpgradeOutcome::Unavailable)
        ));
    }
}
