use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;

use lexchat::api::HttpChatApi;
use lexchat::chat::ConversationId;
use lexchat::config::ApiConfig;
use lexchat::credentials::CredentialStore;
use lexchat::session::{ChatSession, ConnectOutcome, StreamCallbacks};

use crate::args::{CliArgs, Command};
use crate::config::load_config;
use crate::logging::init_logging;
use crate::render::render_state;

pub async fn run() -> anyhow::Result<ExitCode> {
    let args = CliArgs::parse();
    let loaded = load_config(args.config.clone())?;
    let _logger = init_logging(&loaded.config.logging, &loaded.paths)?;

    let mut api_config = loaded.config.api;
    if let Some(base_url) = &args.base_url {
        api_config = ApiConfig {
            timeout_seconds: api_config.timeout_seconds,
            ..ApiConfig::new(base_url.as_str())
        };
    }

    match args.command {
        Command::Login { token } => {
            let mut store = CredentialStore::new().context("opening credential store")?;
            store.set_token(token.trim())?;
            println!("Token saved to {}", store.path().display());
            Ok(ExitCode::SUCCESS)
        }
        Command::Logout => {
            let mut store = CredentialStore::new().context("opening credential store")?;
            if store.clear_token()? {
                println!("Token removed");
            } else {
                println!("No token stored");
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Ask {
            text,
            conversation,
            json,
        } => ask(api_config, &text.join(" "), conversation, json).await,
    }
}

async fn ask(
    api_config: ApiConfig,
    text: &str,
    conversation: Option<i64>,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let store = CredentialStore::new().context("opening credential store")?;
    let callbacks = StreamCallbacks::new()
        .on_connected(|payload| log::info!("stream connected for {}", payload.execution_id))
        .on_iteration(|payload| log::info!("assistant iteration {}", payload.iteration))
        .on_error(|message| log::warn!("chat turn failed: {message}"));
    let mut session =
        ChatSession::new(HttpChatApi::new(api_config), store).with_callbacks(callbacks);

    if let Some(id) = conversation {
        session.set_conversation_id(ConversationId::new(id));
    }

    if session.send(text).await == ConnectOutcome::Opened {
        let interrupted = tokio::select! {
            _ = session.wait() => false,
            _ = tokio::signal::ctrl_c() => true,
        };
        if interrupted {
            log::info!("interrupted, closing chat stream");
            session.disconnect();
        }
    }

    let state = session.state();
    if json {
        println!("{}", serde_json::to_string_pretty(&state.messages)?);
    } else {
        print!("{}", render_state(&state));
    }
    if let Some(id) = state.conversation_id {
        eprintln!("conversation: {id}");
    }

    Ok(if state.error.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}
