//! Routebot CLI: entry point.
//!
//! # Commands
//!
//! - `routebot chat [-m MESSAGE] [-s SESSION]`: single-shot or REPL chat
//! - `routebot tools`: list the capabilities the servers offer
//! - `routebot status`: show configuration and server reachability
//! - `routebot onboard`: write a default config file

mod helpers;
mod onboard;
mod repl;
mod status;
mod tools;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use routebot_agent::{Runtime, TurnRequest};
use routebot_core::config::{load_config, Config};

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// Routebot: routes natural-language requests to remote tools
#[derive(Parser)]
#[command(name = "routebot", version, about, long_about = None)]
struct Cli {
    /// Config file (default: ~/.routebot/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the router (single-shot or interactive REPL)
    Chat {
        /// Single message (non-interactive). Omit for REPL mode.
        #[arg(short, long)]
        message: Option<String>,

        /// Session identifier to continue
        #[arg(short, long)]
        session: Option<String>,

        /// Print the routing diagnostic after each reply
        #[arg(long, default_value_t = false)]
        explain: bool,

        /// Print the full response as JSON
        #[arg(long, default_value_t = false)]
        json: bool,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,

        /// Emit logs as JSON lines
        #[arg(long, default_value_t = false)]
        json_logs: bool,
    },

    /// List capabilities offered by the configured servers
    Tools {
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Show configuration and server reachability
    Status,

    /// Write a default configuration file
    Onboard,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Chat {
            message,
            session,
            explain,
            json,
            logs,
            json_logs,
        } => {
            init_logging(logs, json_logs);
            let runtime = build_runtime(&load_config(config_path))?;
            run_chat(runtime, message, session, explain, json).await
        }
        Commands::Tools { logs } => {
            init_logging(logs, false);
            let runtime = build_runtime(&load_config(config_path))?;
            tools::run(&runtime).await
        }
        Commands::Status => {
            init_logging(false, false);
            status::run(config_path).await
        }
        Commands::Onboard => onboard::run(config_path),
    }
}

/// Validate configuration and assemble the core. Invalid configuration is fatal.
fn build_runtime(config: &Config) -> Result<Runtime> {
    config
        .validate()
        .context("invalid configuration (run `routebot onboard` or `routebot status`)")?;
    routebot_agent::build(config)
}

// ─────────────────────────────────────────────
// Chat command
// ─────────────────────────────────────────────

async fn run_chat(
    runtime: Runtime,
    message: Option<String>,
    session: Option<String>,
    explain: bool,
    json: bool,
) -> Result<()> {
    match message {
        Some(text) => {
            info!(session = ?session, "processing single message");
            let request = TurnRequest {
                session_id: session,
                user_text: text,
                user_id: None,
            };
            let response = runtime.orchestrator.handle_turn(request).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                helpers::print_response(&response, explain);
            }
            Ok(())
        }
        None => repl::run(runtime, session, explain).await,
    }
}

/// Initialize tracing/logging.
///
/// Quiet by default; `--logs` turns on debug output for the workspace crates.
/// `RUST_LOG` overrides both.
fn init_logging(verbose: bool, json: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose {
        "routebot=debug,routebot_core=debug,routebot_mcp=debug,routebot_agent=debug,routebot_providers=debug,info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}
