mod app;
mod config;
mod models;
mod providers;
mod services;
mod shell;
#[cfg(test)]
mod testing;

use std::io::Write;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use app::{App, AppMsg, AppOutput};
use config::{AppConfig, APP_NAME};
use models::{ConnectionId, Identity, Role, ToastKind};
use services::actions::ActionForm;
use shell::{next_event, Transcript};

const HELP: &str = "\
Type a message to chat. Commands:
  /apps                                   list connections
  /connect <gmail|gdocs|slack|instagram>  toggle a connection
  /run <n>                                run action n of the latest answer
  /set <field> <value>                    edit the open confirmation
  /confirm, /cancel                       resolve the open confirmation
  /toasts                                 show notifications still on screen
  /upgrade                                upgrade to Pro
  /signout, /quit";

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they don't interleave with the chat.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = AppConfig::from_env();
    tracing::debug!(?config, "Starting {}", APP_NAME);

    let app = Arc::new(App::init(&config).await?);
    spawn_printers(&app);

    match app.update(AppMsg::SignIn(local_identity())).await {
        AppOutput::SignedIn(Some(user)) => {
            println!("Signed in as {} <{}>.", user.name, user.email);
            if let Some(remaining) = user.remaining_actions() {
                println!("{} of {} free actions left.", remaining, user.actions_limit);
            }
            if user.should_prompt_upgrade() {
                println!("Running low on actions. /upgrade for unlimited actions.");
            }
        }
        _ => println!("Could not sign in; chat is disabled."),
    }
    println!("{}", HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !line.starts_with('/') {
            dispatch(&app, AppMsg::SendMessage(line.to_string()));
            continue;
        }

        let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        match command {
            "/quit" | "/exit" => break,
            "/help" => println!("{}", HELP),
            "/apps" => print_connections(&app),
            "/connect" => match ConnectionId::from_str(rest) {
                Some(id) => dispatch(&app, AppMsg::ToggleConnection(id)),
                None => println!("Unknown app '{}'.", rest),
            },
            "/run" => match latest_action_id(&app, rest) {
                Some(id) => dispatch(&app, AppMsg::RunAction(id)),
                None => println!("No action '{}' in the latest answer.", rest),
            },
            "/set" => {
                let (field, value) = rest.split_once(' ').unwrap_or((rest, ""));
                if !app
                    .confirmations()
                    .edit(|form| form.set_field(field, value.trim()))
                {
                    println!("Nothing open with a '{}' field.", field);
                }
            }
            "/confirm" => match app.confirmations().current() {
                Some(request) => {
                    app.confirmations().confirm(request.form);
                }
                None => println!("Nothing to confirm."),
            },
            "/cancel" => {
                if !app.confirmations().cancel() {
                    println!("Nothing to cancel.");
                }
            }
            "/toasts" => {
                for toast in app.notifier().active() {
                    println!("  {}", toast.message);
                }
            }
            "/upgrade" => dispatch(&app, AppMsg::Upgrade),
            "/signout" => dispatch(&app, AppMsg::SignOut),
            _ => println!("Unknown command. /help lists them."),
        }
    }

    Ok(())
}

fn dispatch(app: &Arc<App>, msg: AppMsg) {
    let app = app.clone();
    tokio::spawn(async move {
        let output = app.update(msg).await;
        tracing::debug!(?output, "Command finished");
    });
}

fn local_identity() -> Identity {
    let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
    Identity {
        id: var("FLOWLINK_USER_ID").unwrap_or_else(|| "local-user".to_string()),
        email: var("FLOWLINK_USER_EMAIL").unwrap_or_else(|| "me@localhost".to_string()),
        name: var("FLOWLINK_USER_NAME"),
        avatar_url: None,
    }
}

/// Id of the `n`th (1-based) action on the latest answer that has any.
fn latest_action_id(app: &App, n: &str) -> Option<String> {
    let n: usize = n.parse().ok()?;
    let latest = app
        .conversation()
        .messages()
        .into_iter()
        .rev()
        .find(|m| m.role == Role::Model && !m.actions.is_empty())?;
    latest.actions.get(n.checked_sub(1)?).map(|a| a.id.clone())
}

fn print_connections(app: &App) {
    for conn in app.session().connections() {
        let state = if conn.coming_soon {
            "coming soon"
        } else if conn.connected {
            "connected"
        } else {
            "off"
        };
        println!("  {:<10} {:<12} {}", conn.id.as_str(), state, conn.description);
    }
}

fn print_form(form: &ActionForm) {
    println!("== {} ==", form.title());
    for (key, value) in form.fields() {
        println!("  {}: {}", key, value);
    }
    println!(
        "  /confirm to {}, /cancel to discard.",
        form.confirm_text().to_lowercase()
    );
}

fn spawn_printers(app: &Arc<App>) {
    let mut toasts = app.notifier().subscribe();
    tokio::spawn(async move {
        while let Some(toast) = next_event(&mut toasts, "toasts").await {
            match toast.kind {
                ToastKind::Success => println!("[ok] {}", toast.message),
                ToastKind::Error => println!("[error] {}", toast.message),
            }
        }
    });

    let mut confirmations = app.confirmations().subscribe();
    tokio::spawn(async move {
        while confirmations.changed().await.is_ok() {
            let current = confirmations.borrow_and_update().clone();
            if let Some(request) = current {
                print_form(&request.form);
            }
        }
    });

    let mut events = app.conversation().subscribe();
    let app = app.clone();
    tokio::spawn(async move {
        let mut transcript = Transcript::default();
        while let Some(event) = next_event(&mut events, "conversation").await {
            let out = transcript.render(&event, |id| app.conversation().find_message(id));
            if !out.is_empty() {
                print!("{}", out);
                let _ = std::io::stdout().flush();
            }
        }
    });
}
