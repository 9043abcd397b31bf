//! `routebot tools`: list capabilities grouped by server.

use anyhow::{Context, Result};
use colored::Colorize;

use routebot_agent::Runtime;
use routebot_core::types::{Capability, CapabilityKind};

/// Refresh the registry and print its contents.
pub async fn run(runtime: &Runtime) -> Result<()> {
    let registry = runtime.orchestrator.registry();
    registry
        .refresh(runtime.pool.as_ref())
        .await
        .context("could not fetch capabilities")?;

    let capabilities = registry.list();
    println!();
    for (server, caps) in group_by_server(&capabilities) {
        println!("  {} {}", server.cyan().bold(), format!("({})", caps.len()).dimmed());
        for cap in caps {
            println!("    {}", describe(cap));
        }
        println!();
    }
    Ok(())
}

/// Groups in first-seen order.
fn group_by_server(capabilities: &[Capability]) -> Vec<(&str, Vec<&Capability>)> {
    let mut groups: Vec<(&str, Vec<&Capability>)> = Vec::new();
    for cap in capabilities {
        match groups.iter_mut().find(|(s, _)| *s == cap.server_id) {
            Some((_, caps)) => caps.push(cap),
            None => groups.push((cap.server_id.as_str(), vec![cap])),
        }
    }
    groups
}

fn describe(cap: &Capability) -> String {
    let mut line = match cap.kind {
        CapabilityKind::Tool => {
            let required = cap.required_parameters();
            format!("{}({})", cap.name.bold(), required.join(", "))
        }
        CapabilityKind::Resource => format!(
            "{} {}",
            cap.name.bold(),
            cap.uri.as_deref().unwrap_or_default().dimmed()
        ),
    };
    if !cap.description.is_empty() {
        line.push_str(&format!(": {}", cap.description));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn groups_keep_discovery_order() {
        let caps = vec![
            Capability::tool("shop", "search", "", json!({})),
            Capability::tool("library", "loans", "", json!({})),
            Capability::resource("shop", "catalog", "", "shop://catalog"),
        ];
        let groups = group_by_server(&caps);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "shop");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "library");
    }

    #[test]
    fn describe_lists_required_parameters() {
        colored::control::set_override(false);
        let cap = Capability::tool(
            "shop",
            "search_products",
            "Search products",
            json!({"required": ["category", "limit"]}),
        );
        assert_eq!(describe(&cap), "search_products(category, limit): Search products");
    }
}
