//! Shared CLI helpers: response printing, banner, diagnostics.

use colored::Colorize;

use routebot_agent::{Diagnostic, TurnResponse};

/// Print a turn response to stdout.
pub fn print_response(response: &TurnResponse, explain: bool) {
    println!();
    let label = if response.success {
        "Routebot".cyan().bold()
    } else {
        "Routebot".red().bold()
    };
    println!("{label}");
    if response.response_text.is_empty() {
        println!("{}", "(no response)".dimmed());
    } else {
        println!("{}", response.response_text);
    }
    if let Some(kind) = &response.error {
        println!("{}", format!("[{kind}]").red().dimmed());
    }
    if explain {
        if let Some(diag) = &response.diagnostic {
            println!("{}", describe_diagnostic(diag).dimmed());
        }
    }
    println!();
}

/// One-line routing summary.
pub fn describe_diagnostic(diag: &Diagnostic) -> String {
    let capability = diag.capability_used.as_deref().unwrap_or("none");
    let server = diag.server_used.as_deref().unwrap_or("-");
    let mut line = format!(
        "↳ capability: {capability} @ {server}, confidence {:.2}",
        diag.confidence
    );
    if !diag.rationale.is_empty() {
        line.push_str(&format!(" ({})", diag.rationale));
    }
    line
}

/// Print the banner shown at REPL start.
pub fn print_banner(session_id: &str) {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "Routebot".cyan().bold(), version.dimmed());
    println!(
        "{}",
        "Type a request, /help for commands, or /exit to quit.".dimmed()
    );
    println!("{}", format!("session: {session_id}").dimmed());
    println!();
}

/// Print a "thinking" placeholder.
pub fn print_thinking() {
    eprint!("{}", "⠿ thinking...".dimmed());
}

/// Clear the "thinking" placeholder.
pub fn clear_thinking() {
    eprint!("\r{}\r", " ".repeat(40));
}

/// Green check or red cross.
pub fn mark(ok: bool) -> String {
    if ok {
        "✓".green().to_string()
    } else {
        "✗".red().to_string()
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostic_line() {
        let diag = Diagnostic {
            server_used: Some("shop".into()),
            capability_used: Some("search_products".into()),
            confidence: 0.9,
            rationale: "catalog search".into(),
        };
        assert_eq!(
            describe_diagnostic(&diag),
            "↳ capability: search_products @ shop, confidence 0.90 (catalog search)"
        );
    }

    #[test]
    fn diagnostic_without_choice() {
        let diag = Diagnostic {
            server_used: None,
            capability_used: None,
            confidence: 0.1,
            rationale: String::new(),
        };
        assert_eq!(
            describe_diagnostic(&diag),
            "↳ capability: none @ -, confidence 0.10"
        );
    }
}
