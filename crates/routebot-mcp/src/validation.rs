//! Argument checking against a capability's JSON parameter schema.
//!
//! Only the subset of JSON Schema that tool servers publish in practice is
//! understood: `type`, `properties`, `required`, `enum` and
//! `additionalProperties: false`. Unknown keywords are ignored.

use serde_json::{Map, Value};

use routebot_core::types::Capability;

use crate::error::McpError;

/// Coerce string-encoded scalars to the types the schema asks for.
///
/// Models often emit `"5"` for an integer or `"true"` for a boolean. Values
/// that cannot be coerced are left untouched for [`validate_arguments`] to
/// report.
pub fn normalize_arguments(schema: &Value, arguments: &mut Map<String, Value>) {
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return;
    };
    for (name, value) in arguments.iter_mut() {
        let Some(expected) = properties.get(name).and_then(|p| p.get("type")).and_then(Value::as_str)
        else {
            continue;
        };
        let Value::String(text) = &*value else {
            continue;
        };
        let text = text.trim();
        let coerced = match expected {
            "integer" => text.parse::<i64>().ok().map(Value::from),
            "number" => text.parse::<f64>().ok().and_then(|n| {
                serde_json::Number::from_f64(n).map(Value::Number)
            }),
            "boolean" => match text.to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        };
        if let Some(v) = coerced {
            *value = v;
        }
    }
}

/// Check arguments against the capability's schema.
///
/// Required fields must be present and non-null. Declared types and enum
/// membership are enforced for every supplied property.
pub fn validate_arguments(
    capability: &Capability,
    arguments: &Map<String, Value>,
) -> Result<(), McpError> {
    let invalid = |reason: String| McpError::InvalidArguments {
        capability: capability.name.clone(),
        reason,
    };
    let schema = &capability.parameter_schema;

    for field in capability.required_parameters() {
        match arguments.get(field) {
            None | Some(Value::Null) => {
                return Err(invalid(format!("missing required field: '{field}'")))
            }
            Some(_) => {}
        }
    }

    let properties = schema.get("properties").and_then(Value::as_object);
    let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));

    for (name, value) in arguments {
        let Some(spec) = properties.and_then(|p| p.get(name)) else {
            if closed {
                return Err(invalid(format!("unexpected field: '{name}'")));
            }
            continue;
        };
        if value.is_null() {
            continue;
        }
        if let Some(expected) = spec.get("type") {
            if !type_matches(expected, value) {
                return Err(invalid(format!(
                    "field '{name}' should be {}, got {}",
                    describe_type(expected),
                    json_type_name(value)
                )));
            }
        }
        if let Some(allowed) = spec.get("enum").and_then(Value::as_array) {
            if !allowed.contains(value) {
                let options: Vec<String> = allowed.iter().map(Value::to_string).collect();
                return Err(invalid(format!(
                    "field '{name}' must be one of [{}]",
                    options.join(", ")
                )));
            }
        }
    }
    Ok(())
}

/// `type` may be a single name or a list of names.
fn type_matches(expected: &Value, value: &Value) -> bool {
    match expected {
        Value::String(t) => single_type_matches(t, value),
        Value::Array(ts) => ts
            .iter()
            .filter_map(Value::as_str)
            .any(|t| single_type_matches(t, value)),
        _ => true,
    }
}

fn single_type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn describe_type(expected: &Value) -> String {
    match expected {
        Value::String(t) => t.clone(),
        Value::Array(ts) => ts
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" or "),
        other => other.to_string(),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
