//! Server, client and translator command handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use lolang_relay::agent::{LoopOutcome, StopReason};
use lolang_relay::client::{run_client, ClientOptions};
use lolang_relay::config::Config;
use lolang_relay::display;
use lolang_relay::lolang::Decryptor;
use lolang_relay::providers::{GeminiBackend, GenerationBackend};
use lolang_relay::server::{run_server, ServerOptions};
use lolang_relay::translator::{run_translator, Translator};
use lolang_relay::utils::shutdown_channel;

/// Flip the returned receiver to `true` on Ctrl+C.
fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = shutdown_channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, shutting down");
            let _ = tx.send(true);
        } else {
            // Keep the sender alive so the receivers do not treat its drop as a stop.
            std::future::pending::<()>().await;
        }
    });
    rx
}

/// Refuse to start a generating command without credentials.
fn require_api_key(config: &Config) -> Result<()> {
    match &config.generation.api_key {
        Some(key) if !key.trim().is_empty() => Ok(()),
        _ => anyhow::bail!(
            "No API key configured. Set LOLANG_GENERATION_API_KEY (or GEMINI_API_KEY) \
             in the environment or a .env file."
        ),
    }
}

/// Refuse to start with settings that `Config::validate` rejects.
fn require_valid(config: &Config) -> Result<()> {
    let problems = config.validate();
    if problems.is_empty() {
        return Ok(());
    }
    for problem in &problems {
        display::print_error(problem);
    }
    anyhow::bail!("Invalid configuration: {}", problems.join("; "))
}

fn backend() -> Arc<dyn GenerationBackend> {
    Arc::new(GeminiBackend::new())
}

fn report_outcome(outcome: &LoopOutcome) {
    let text = match outcome.reason {
        StopReason::MaxTurns => format!(
            "Maximum conversation turns reached ({}). Ending conversation.",
            outcome.turns
        ),
        StopReason::Cancelled => format!("Stopped after {} turn(s).", outcome.turns),
        StopReason::InboundClosed => {
            format!("Peer disconnected after {} turn(s).", outcome.turns)
        }
    };
    display::print_system(&text);
}

pub(crate) async fn cmd_server(
    mut config: Config,
    host: Option<String>,
    port: Option<u16>,
    max_turns: Option<u32>,
    quiet: bool,
) -> Result<()> {
    require_api_key(&config)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(max_turns) = max_turns {
        config.conversation.max_turns = max_turns;
    }
    require_valid(&config)?;

    let options = ServerOptions {
        observer: (!quiet).then(display::transcript_printer),
    };

    display::print_system(&format!("Server starting at {}", config.server.url()));
    display::print_system("Press Ctrl+C to stop the server");

    let result = run_server(&config, backend(), options, shutdown_on_ctrl_c()).await;
    match result {
        Ok(outcome) => {
            report_outcome(&outcome);
            println!("{}", display::colorize("Server closed", display::YELLOW));
            Ok(())
        }
        Err(e) => {
            display::print_error(&e.to_string());
            Err(e).context("Server failed")
        }
    }
}

pub(crate) async fn cmd_client(
    mut config: Config,
    url: Option<String>,
    message: Option<String>,
    max_turns: Option<u32>,
    quiet: bool,
) -> Result<()> {
    require_api_key(&config)?;
    if let Some(max_turns) = max_turns {
        config.conversation.max_turns = max_turns;
    }
    require_valid(&config)?;

    let options = ClientOptions {
        url,
        opener: message,
        observer: (!quiet).then(display::transcript_printer),
    };

    let result = run_client(&config, backend(), options, shutdown_on_ctrl_c()).await;
    match result {
        Ok(outcome) => {
            report_outcome(&outcome);
            println!("{}", display::colorize("Connection closed", display::YELLOW));
            Ok(())
        }
        Err(e) => {
            display::print_error(&e.to_string());
            Err(e).context("Client failed")
        }
    }
}

pub(crate) async fn cmd_translate(
    config: Config,
    url: Option<String>,
    no_decrypt: bool,
) -> Result<()> {
    let decrypt = config.translator.decrypt && !no_decrypt;
    let has_key = require_api_key(&config).is_ok();
    if decrypt && !has_key {
        warn!("No API key configured, showing messages without translation");
    }
    let decryptor = (decrypt && has_key)
        .then(|| Decryptor::new(backend(), &config.generation, &config.translator));

    let url = url.unwrap_or_else(|| config.server.url());
    let count = run_translator(&url, Translator::new(decryptor), shutdown_on_ctrl_c())
        .await
        .with_context(|| format!("Translator failed for {}", url))?;
    info!(messages = count, "Translator exited");
    Ok(())
}
