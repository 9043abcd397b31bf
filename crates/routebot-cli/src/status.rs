//! `routebot status`: configuration summary and server reachability.

use std::path::Path;

use anyhow::Result;
use colored::Colorize;

use routebot_core::config::{get_config_path, load_config, Config};
use routebot_mcp::ServerPool;

use crate::helpers::mark;

/// Run the status command.
pub async fn run(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path);
    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(get_config_path);

    println!();
    println!("{}", "Routebot Status".cyan().bold());
    println!();

    println!(
        "  {:<14} {} {}",
        "Config:".bold(),
        path.display(),
        if path.exists() {
            mark(true)
        } else {
            "(not found, using defaults)".red().to_string()
        }
    );
    print_llm(&config);

    match config.validate() {
        Ok(()) => println!("  {:<14} {}", "Validation:".bold(), mark(true)),
        Err(e) => {
            println!("  {:<14} {} {e}", "Validation:".bold(), mark(false));
            println!();
            return Ok(());
        }
    }

    let runtime = routebot_agent::build(&config)?;
    print_servers(&runtime.pool).await;
    Ok(())
}

fn print_llm(config: &Config) {
    let llm = &config.llm;
    println!("  {:<14} {}", "Provider:".bold(), llm.provider);
    println!("  {:<14} {}", "Model:".bold(), llm.model);
    if let Some(base) = &llm.api_base {
        println!("  {:<14} {}", "Endpoint:".bold(), base);
    }
    println!(
        "  {:<14} {}",
        "API key:".bold(),
        if llm.is_configured() {
            format!("{} set", mark(true))
        } else {
            "· not set".dimmed().to_string()
        }
    );
    println!(
        "  {:<14} {}",
        "Routing:".bold(),
        format!(
            "confidence ≥ {}, {} retries, {}s deadline",
            config.intent.confidence_threshold,
            config.remote.retry.max_retries,
            config.remote.invoke_deadline_secs
        )
        .dimmed()
    );
}

/// Probe every server and print one line each.
pub async fn print_servers(pool: &ServerPool) {
    println!();
    println!("  {}", "Servers:".bold());
    for status in pool.probe().await {
        let detail = match &status.error {
            Some(e) => e.red().to_string(),
            None => "reachable".green().to_string(),
        };
        println!(
            "    {} {:<12} {} {}",
            mark(status.connected),
            status.name,
            status.url.dimmed(),
            detail
        );
    }
    println!();
}
