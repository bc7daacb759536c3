//! CLI module: command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod config;
pub mod relay;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};

use lolang_relay::config::Config;

#[derive(Parser)]
#[command(name = "lolang")]
#[command(version)]
#[command(about = "Two LLM agents conversing in LOLANG over a websocket relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for connections and run the server-side agent
    Server {
        /// Bind host (overrides server.host)
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides server.port)
        #[arg(short, long)]
        port: Option<u16>,
        /// Stop after this many turns (overrides conversation.max_turns)
        #[arg(long)]
        max_turns: Option<u32>,
        /// Do not print the conversation transcript
        #[arg(short, long)]
        quiet: bool,
    },
    /// Connect to a server and run the client-side agent
    Client {
        /// Server URL (defaults to ws://{server.host}:{server.port})
        #[arg(long)]
        url: Option<String>,
        /// Opening message (overrides conversation.initial_message)
        #[arg(short, long)]
        message: Option<String>,
        /// Stop after this many turns (overrides conversation.max_turns)
        #[arg(long)]
        max_turns: Option<u32>,
        /// Do not print the conversation transcript
        #[arg(short, long)]
        quiet: bool,
    },
    /// Connect to a server and show every message with its translation
    Translate {
        /// Server URL (defaults to ws://{server.host}:{server.port})
        #[arg(long)]
        url: Option<String>,
        /// Show encoded messages only
        #[arg(long)]
        no_decrypt: bool,
    },
    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show version information
    Version,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the effective configuration
    Check,
    /// Print the effective configuration (API key redacted)
    Show,
}

/// Entry point for the CLI, called from main().
pub async fn run() -> Result<()> {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let config = Config::load().with_context(|| {
        format!("Failed to load configuration from {}", Config::path().display())
    })?;
    lolang_relay::utils::logging::init_logging(&config.logging)
        .context("Failed to initialise logging")?;

    match cli.command {
        None => {
            let mut cmd = Cli::command();
            cmd.print_help()?;
            println!();
        }
        Some(Commands::Version) => {
            println!("lolang {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Server {
            host,
            port,
            max_turns,
            quiet,
        }) => {
            relay::cmd_server(config, host, port, max_turns, quiet).await?;
        }
        Some(Commands::Client {
            url,
            message,
            max_turns,
            quiet,
        }) => {
            relay::cmd_client(config, url, message, max_turns, quiet).await?;
        }
        Some(Commands::Translate { url, no_decrypt }) => {
            relay::cmd_translate(config, url, no_decrypt).await?;
        }
        Some(Commands::Config { action }) => {
            config::cmd_config(&config, action)?;
        }
    }

    Ok(())
}
