//! Interactive REPL.
//!
//! Uses `rustyline` for readline-style editing with persistent history.

use anyhow::Result;
use colored::Colorize;
use rustyline::config::Configurer;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use tracing::debug;

use routebot_agent::{Runtime, TurnRequest};
use routebot_core::session::SessionStore;
use routebot_core::utils::new_session_id;

use crate::{helpers, status, tools};

/// A line the REPL handles itself instead of sending as a turn.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Exit,
    Help,
    Tools,
    Status,
    Reset,
    New,
    Unknown(String),
}

/// Parse slash commands and bare exit words (case-insensitive).
fn parse_command(input: &str) -> Option<Command> {
    let lower = input.to_lowercase();
    match lower.as_str() {
        "exit" | "quit" | "/exit" | "/quit" | ":q" => Some(Command::Exit),
        "/help" | "/?" => Some(Command::Help),
        "/tools" => Some(Command::Tools),
        "/status" => Some(Command::Status),
        "/reset" => Some(Command::Reset),
        "/new" => Some(Command::New),
        other if other.starts_with('/') => Some(Command::Unknown(input.to_string())),
        _ => None,
    }
}

/// Run the interactive REPL loop.
pub async fn run(runtime: Runtime, session: Option<String>, explain: bool) -> Result<()> {
    let mut session_id = session.unwrap_or_else(new_session_id);
    helpers::print_banner(&session_id);

    let mut editor = create_editor()?;

    loop {
        let input = match editor.readline("You: ") {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted)
            | Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(trimmed);

        match parse_command(trimmed) {
            Some(Command::Exit) => {
                println!("\nGoodbye!");
                break;
            }
            Some(Command::Help) => print_help(),
            Some(Command::Tools) => {
                if let Err(e) = tools::run(&runtime).await {
                    eprintln!("{} {e:#}", "Error:".red());
                }
            }
            Some(Command::Status) => status::print_servers(&runtime.pool).await,
            Some(Command::Reset) => {
                let notice = restart(runtime.orchestrator.sessions(), &mut session_id, false);
                println!("{}", notice.dimmed());
            }
            Some(Command::New) => {
                let notice = restart(runtime.orchestrator.sessions(), &mut session_id, true);
                println!("{}", notice.dimmed());
            }
            Some(Command::Unknown(cmd)) => {
                println!("{}", format!("Unknown command {cmd}. Try /help.").yellow());
            }
            None => {
                debug!(session = %session_id, input = trimmed, "processing input");
                helpers::print_thinking();
                let request = TurnRequest::new(trimmed).with_session(session_id.clone());
                let response = runtime.orchestrator.handle_turn(request).await;
                helpers::clear_thinking();
                session_id = response.session_id.clone();
                helpers::print_response(&response, explain);
            }
        }
    }

    save_history(&mut editor);
    Ok(())
}

/// `/reset` clears the current session's history and keeps its id; `/new`
/// drops the session and switches to a freshly minted id.
fn restart(sessions: &SessionStore, session_id: &mut String, fresh: bool) -> String {
    if fresh {
        sessions.remove(session_id);
        *session_id = new_session_id();
        format!("Started a new session: {session_id}")
    } else {
        sessions.clear(session_id);
        "Cleared the conversation history.".to_string()
    }
}

fn print_help() {
    println!();
    println!("  {}   list available capabilities", "/tools".bold());
    println!("  {}  show server reachability", "/status".bold());
    println!("  {}   clear this conversation's history", "/reset".bold());
    println!("  {}     start a new session", "/new".bold());
    println!("  {}    quit", "/exit".bold());
    println!();
}

/// Create a rustyline editor with history.
fn create_editor() -> Result<Editor<(), DefaultHistory>> {
    let mut editor = DefaultEditor::new()?;
    editor.set_max_history_size(1000)?;

    let history_path = history_path();
    if history_path.exists() {
        let _ = editor.load_history(&history_path);
        debug!("loaded REPL history from {}", history_path.display());
    }

    Ok(editor)
}

/// Save history to disk.
fn save_history(editor: &mut Editor<(), DefaultHistory>) {
    let path = history_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = editor.save_history(&path) {
        debug!("failed to save history: {e}");
    }
}

fn history_path() -> std::path::PathBuf {
    routebot_core::utils::get_data_path()
        .join("history")
        .join("cli_history")
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
