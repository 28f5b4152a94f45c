mod commands;
mod config;
mod terminal;

use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::Parser;
use client_core::{FirestoreStore, IdentityToolkitProvider, SessionViewController};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use crate::{
    commands::{UiCommand, HELP},
    config::{load_settings, DEFAULT_CONFIG_FILE},
    terminal::{TerminalNotifier, TerminalView},
};

#[derive(Parser, Debug)]
#[command(about = "Signs in and shows the records of a remote collection")]
struct Args {
    /// Settings file; `APP__*` environment variables take precedence.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Collection to render instead of the configured one.
    #[arg(long)]
    collection: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_settings(&args.config);
    if let Some(collection) = args.collection {
        settings.collection = collection;
    }
    let missing = settings.missing_fields();
    if !missing.is_empty() {
        bail!(
            "missing settings: {} (set them in {} or as APP__* variables)",
            missing.join(", "),
            args.config.display()
        );
    }

    let http = reqwest::Client::builder()
        .user_agent(concat!("viewer/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build http client")?;
    let identity =
        Arc::new(IdentityToolkitProvider::open(http.clone(), settings.identity_config()).await);
    let store = FirestoreStore::new(http, settings.firestore_config())
        .with_access_tokens(identity.clone());

    let view = TerminalView::default();
    let controller = SessionViewController::new(
        identity,
        Arc::new(store),
        Arc::new(TerminalNotifier),
        Box::new(view.clone()),
        settings.collection.clone(),
    );
    tracing::info!(collection = %settings.collection, "viewer started");

    let session_loop = tokio::spawn(controller.clone().run_session_loop());
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("failed to read stdin")? {
        let Some(command) = UiCommand::parse(&line) else {
            println!("unknown command '{}'; {HELP}", line.trim());
            continue;
        };
        tracing::debug!(command = command.name(), "ui command");
        match command {
            UiCommand::SignIn => {
                // Failures are already shown and logged by the controller.
                let _ = controller.request_sign_in().await;
            }
            UiCommand::SignOut => {
                let _ = controller.request_sign_out().await;
            }
            UiCommand::Show => view.print(),
            UiCommand::Help => println!("{HELP}"),
            UiCommand::Quit => break,
        }
    }

    session_loop.abort();
    Ok(())
}
