//! `routebot onboard`: write a starter configuration.

use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;

use routebot_core::config::{get_config_path, save_config, Config, ServerConfig};

/// Example server written into a fresh config.
const EXAMPLE_SERVER_URL: &str = "http://localhost:8000/mcp";

/// Run the onboard command.
pub fn run(config_path: Option<&Path>) -> Result<()> {
    println!();
    println!("{}", "Routebot Setup".cyan().bold());
    println!();

    let path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(get_config_path);

    if path.exists() {
        println!("  {} config already exists at {}", "✓".green(), path.display());
    } else {
        save_config(&starter_config(), Some(&path))
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("  {} created config at {}", "✓".green(), path.display());
    }

    println!();
    println!("{}", "Next steps:".bold());
    println!("  1. Set llm.apiKey (or OPENAI_API_KEY / AZURE_OPENAI_API_KEY)");
    println!("  2. Point servers[].url at your tool server (or set MCP_SERVER_URL)");
    println!("  3. Run {}", "routebot chat".cyan());
    println!();
    Ok(())
}

fn starter_config() -> Config {
    let mut config = Config::default();
    let mut server = ServerConfig::new("default", EXAMPLE_SERVER_URL);
    server.description = "Local tool server".into();
    config.servers.push(server);
    config
}
