//! Prompt construction for the three LLM calls a turn can make: choosing a
//! capability, summarising a result, and guiding a user whose request
//! matched nothing.

use serde_json::Value;

use routebot_core::types::{Capability, CapabilityKind, Message, Turn};
use routebot_core::utils::truncate_string;

/// Capabilities shown in no-match guidance.
pub const GUIDANCE_LIMIT: usize = 8;

/// Payload characters passed to the summary prompt.
const PAYLOAD_PROMPT_CHARS: usize = 6000;

const ROUTER_INSTRUCTIONS: &str = "\
You are a request router. Read the user's request and pick the ONE capability \
below that fulfils it, together with the arguments to call it with.

Rules:
- Only choose a capability from the catalog. Never invent names or arguments.
- Use the exact parameter names from the capability's schema.
- Resources take no arguments.
- If the request is ambiguous, unrelated to every capability, or missing a \
required value, set \"capability\" to null, set \"requires_clarification\" to \
true and put a short follow-up question in \"clarification_question\".
- \"confidence\" is a number between 0 and 1 reflecting how sure you are.

Respond with a single JSON object and nothing else:
{
  \"capability\": \"name or null\",
  \"server\": \"server of the chosen capability or null\",
  \"arguments\": {\"param\": \"value\"},
  \"confidence\": 0.0,
  \"rationale\": \"one sentence explaining the choice\",
  \"requires_clarification\": false,
  \"clarification_question\": null
}";

/// Render the capability catalog for the routing prompt.
pub fn build_catalog(capabilities: &[Capability], max_entries: usize) -> String {
    if capabilities.is_empty() {
        return "(no capabilities are currently available)".to_string();
    }
    let mut lines = Vec::new();
    for cap in capabilities.iter().take(max_entries) {
        let mut line = format!("- {} [{}] (server: {})", cap.name, cap.kind, cap.server_id);
        if !cap.description.is_empty() {
            line.push_str(&format!(": {}", cap.description));
        }
        if cap.kind == CapabilityKind::Tool {
            let schema = serde_json::to_string(&cap.parameter_schema).unwrap_or_default();
            line.push_str(&format!("\n  parameters: {schema}"));
        }
        lines.push(line);
    }
    if capabilities.len() > max_entries {
        lines.push(format!(
            "({} more capabilities not shown)",
            capabilities.len() - max_entries
        ));
    }
    lines.join("\n")
}

/// Messages for the routing call: instructions and catalog, recent history,
/// then the new request.
pub fn resolution_messages(
    user_text: &str,
    capabilities: &[Capability],
    history: &[Turn],
    max_catalog_entries: usize,
) -> Vec<Message> {
    let system = format!(
        "{ROUTER_INSTRUCTIONS}\n\n# Capability catalog\n\n{}",
        build_catalog(capabilities, max_catalog_entries)
    );
    let mut messages = vec![Message::system(system)];
    for turn in history {
        messages.extend(turn.to_messages());
    }
    messages.push(Message::user(user_text));
    messages
}

/// Follow-up sent after output that could not be parsed.
pub fn corrective_prompt(problem: &str) -> String {
    format!(
        "Your previous reply could not be used ({problem}). Reply again with ONLY \
         the JSON object described in the instructions: no code fences, no \
         commentary, no trailing commas."
    )
}

/// Messages asking the model to explain a successful result.
pub fn interpretation_messages(
    user_text: &str,
    capability: &Capability,
    payload: &Value,
) -> Vec<Message> {
    let rendered = serde_json::to_string_pretty(payload).unwrap_or_else(|_| payload.to_string());
    let prompt = format!(
        "Original request: {user_text}\n\n\
         Capability used: {} ({})\n\n\
         Result:\n{}\n\n\
         Write the reply to the user:\n\
         1. Restate briefly what they asked for.\n\
         2. Say clearly whether what they asked for was found.\n\
         3. Summarise the most relevant details in 1-3 short sentences.\n\
         Keep it conversational and concise. Do not mention tools, servers or JSON.",
        capability.name,
        capability.description,
        truncate_string(&rendered, PAYLOAD_PROMPT_CHARS)
    );
    vec![
        Message::system("You explain results from backend services to end users."),
        Message::user(prompt),
    ]
}

/// Messages asking the model to guide a user whose request matched nothing.
pub fn guidance_messages(
    user_text: &str,
    capabilities: &[Capability],
    question: Option<&str>,
) -> Vec<Message> {
    let mut prompt = format!(
        "The user asked: \"{user_text}\"\n\n\
         No capability was confidently identified for this request.\n\n\
         Reply as a helpful assistant:\n\
         - Acknowledge the request briefly.\n\
         - Explain that you could not match it to something you can do.\n\
         - Offer guidance using the capabilities below, with one concise example.\n\
         - Ask one clarifying question if it helps.\n\n\
         Available capabilities:\n{}\n\n\
         Keep the reply to 2-5 sentences.",
        capability_lines(capabilities)
    );
    if let Some(q) = question {
        prompt.push_str(&format!("\n\nA good clarifying question would be: {q}"));
    }
    vec![
        Message::system("You help users phrase requests a routing assistant can act on."),
        Message::user(prompt),
    ]
}

/// Fixed guidance used when the model cannot phrase it.
pub fn fallback_guidance(capabilities: &[Capability], question: Option<&str>) -> String {
    let mut text = String::from("I couldn't match that request to something I can do.");
    if let Some(q) = question {
        text.push(' ');
        text.push_str(q);
    }
    if capabilities.is_empty() {
        text.push_str(" Could you rephrase it with a bit more detail?");
        return text;
    }
    text.push_str(" Here is what I can help with:\n");
    text.push_str(&capability_lines(capabilities));
    if let Some(example) = capabilities.iter().find(|c| c.kind == CapabilityKind::Tool) {
        text.push_str(&format!(
            "\n\nFor example, ask me something that needs `{}`.",
            example.name
        ));
    }
    text
}

fn capability_lines(capabilities: &[Capability]) -> String {
    capabilities
        .iter()
        .take(GUIDANCE_LIMIT)
        .map(|c| {
            if c.description.is_empty() {
                format!("- {}", c.name)
            } else {
                format!("- {}: {}", c.name, c.description)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Deterministic summary used when the model cannot write one.
pub fn fallback_summary(capability: &Capability, payload: &Value) -> String {
    match payload {
        Value::Array(items) if items.is_empty() => {
            format!("I ran {} but found no matching results.", capability.name)
        }
        Value::Array(items) => {
            let labels: Vec<&str> = items.iter().filter_map(item_label).take(5).collect();
            let noun = if items.len() == 1 { "result" } else { "results" };
            if labels.is_empty() {
                format!("I ran {} and found {} {noun}.", capability.name, items.len())
            } else {
                format!(
                    "I ran {} and found {} {noun}: {}.",
                    capability.name,
                    items.len(),
                    labels.join(", ")
                )
            }
        }
        Value::Null => format!("{} completed with no data to show.", capability.name),
        Value::String(s) => truncate_string(s, 500),
        other => format!(
            "Here is what {} returned: {}",
            capability.name,
            truncate_string(&other.to_string(), 500)
        ),
    }
}

fn item_label(item: &Value) -> Option<&str> {
    match item {
        Value::String(s) => Some(s),
        Value::Object(map) => ["name", "title", "label", "id"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str)),
        _ => None,
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn catalog() -> Vec<Capability> {
        vec![
            Capability::tool(
                "shop",
                "search_products",
                "Search products by category",
                json!({"type": "object", "properties": {"category": {"type": "string"}}, "required": ["category"]}),
            ),
            Capability::resource("shop", "catalog", "Full product catalog", "shop://catalog"),
        ]
    }

    #[test]
    fn test_catalog_lists_server_kind_and_schema() {
        let text = build_catalog(&catalog(), 50);
        assert!(text.contains("- search_products [tool] (server: shop): Search products by category"));
        assert!(text.contains("\"required\":[\"category\"]"));
        assert!(text.contains("- catalog [resource] (server: shop)"));
        assert_eq!(text.matches("parameters:").count(), 1);
    }

    #[test]
    fn test_catalog_truncation_and_empty() {
        let text = build_catalog(&catalog(), 1);
        assert!(text.contains("(1 more capabilities not shown)"));
        assert!(build_catalog(&[], 10).contains("no capabilities"));
    }

    #[test]
    fn test_resolution_messages_order() {
        let history = vec![Turn::new("hi", "hello")];
        let msgs = resolution_messages("Show me electronics", &catalog(), &history, 50);
        assert_eq!(msgs.len(), 4);
        assert!(matches!(msgs[0], Message::System { .. }));
        assert_eq!(msgs[1].content(), Some("hi"));
        assert_eq!(msgs[2].content(), Some("hello"));
        assert_eq!(msgs[3].content(), Some("Show me electronics"));
    }

    #[test]
    fn test_fallback_summary_lists_items() {
        let cap = &catalog()[0];
        let payload = json!([{"name": "TV"}, {"name": "Phone"}, {"name": "Laptop"}]);
        assert_eq!(
            fallback_summary(cap, &payload),
            "I ran search_products and found 3 results: TV, Phone, Laptop."
        );
        assert!(fallback_summary(cap, &json!([])).contains("no matching results"));
        assert!(fallback_summary(cap, &Value::Null).contains("no data"));
        assert_eq!(fallback_summary(cap, &json!("3 items")), "3 items");
    }

    #[test]
    fn test_guidance_caps_listing() {
        let many: Vec<Capability> = (0..12)
            .map(|i| Capability::tool("s", format!("tool_{i}"), "does things", json!({})))
            .collect();
        let text = fallback_guidance(&many, Some("What are you looking for?"));
        assert_eq!(text.matches("- tool_").count(), GUIDANCE_LIMIT);
        assert!(text.contains("What are you looking for?"));
        assert!(text.contains("`tool_0`"));

        let msgs = guidance_messages("asdkjasd", &many, None);
        assert!(msgs[1].content().unwrap().contains("asdkjasd"));
    }
}
