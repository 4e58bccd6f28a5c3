//! Wanderlog - command line client for the travel journal API.

use std::io;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use wl_session::file_store::default_storage_dir;
use wl_session::{
    ActivitySignal, ApiClient, EnvSecretProvider, FileCredentialStore, FileSnapshotStore,
    IdleMonitor, RestoreOutcome, SessionContext, SessionEvent,
};
use wl_settings::SettingsStore;

const PASSWORD_VAR: &str = "WANDERLOG_PASSWORD";

#[derive(Parser, Debug)]
#[command(name = "wanderlog", version, about = "Travel journal client")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Re-validate the stored session and show who is signed in
    Status,
    /// Sign in; the password is read from WANDERLOG_PASSWORD or stdin
    Login { email: String },
    /// Sign out and forget the stored credential
    Logout,
    /// Print the journals of followed users
    Feed,
    /// Keep the session open; every line typed on stdin counts as activity
    Watch,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

async fn build_client() -> Result<ApiClient> {
    let settings = SettingsStore::default_location()?
        .load_with_env()
        .await
        .context("Failed to load settings")?;
    let config = settings.to_session_config()?;

    let storage_dir = default_storage_dir().context("Failed to resolve storage directory")?;
    let credentials = FileCredentialStore::open(
        &storage_dir,
        Arc::new(EnvSecretProvider::default()),
        config.credential_retention,
    )
    .await
    .context("Failed to open credential store")?;
    let snapshots = FileSnapshotStore::new(&storage_dir)?;

    let ctx = Arc::new(SessionContext::new(
        Arc::new(credentials),
        Arc::new(snapshots),
    ));
    Ok(ApiClient::new(config, ctx)?)
}

async fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_VAR) {
        return Ok(password);
    }
    eprint!("Password: ");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read password")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

async fn require_session(client: &ApiClient) -> Result<()> {
    match client.restore_session().await? {
        RestoreOutcome::Authenticated(user) => {
            info!("Signed in as {}", user.display_name());
            Ok(())
        }
        RestoreOutcome::Blocked => bail!("Your account is blocked, contact administrator"),
        RestoreOutcome::SignedOut => bail!("Not signed in, run `wanderlog login <email>`"),
    }
}

/// Hold the session open until it ends, feeding stdin lines to the idle monitor
async fn watch(client: &ApiClient) -> Result<()> {
    require_session(client).await?;

    let ctx = client.context();
    let mut events = ctx.subscribe();
    let idle = IdleMonitor::from_config(Arc::clone(ctx), client.config()).start();
    let activity = idle.listener();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(SessionEvent::Ended(reason)) => {
                    println!("Session ended: {reason:?}");
                    break;
                }
                Ok(SessionEvent::SignedIn(_)) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed session events"),
                Err(RecvError::Closed) => break,
            },
            line = lines.next_line() => match line? {
                Some(_) => {
                    activity.record(ActivitySignal::KeyPress);
                }
                None => break,
            },
        }
    }

    idle.cancel();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();
    let client = build_client().await?;

    match cli.command.unwrap_or(Command::Status) {
        Command::Status => require_session(&client).await?,
        Command::Login { email } => {
            let password = read_password().await?;
            let user = client.login(&email, &password).await?;
            println!("Welcome, {}", user.display_name());
        }
        Command::Logout => {
            client.logout().await?;
            println!("Signed out");
        }
        Command::Feed => {
            require_session(&client).await?;
            for journal in client.feed().await? {
                println!("#{} {}", journal.id, journal.title);
            }
        }
        Command::Watch => watch(&client).await?,
    }

    Ok(())
}
