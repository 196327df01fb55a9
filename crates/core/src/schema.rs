//! Argument validation against a tool's declared input schema.
//!
//! Covers the subset of JSON Schema that tool definitions actually use:
//! `type`, `required`, `properties`, `enum`, `items`, `minimum`/`maximum`
//! and `additionalProperties` (either `false` or a schema for the extra
//! keys). Unknown keywords are ignored.

use serde_json::Value;

/// Validate `arguments` against `schema`.
///
/// Returns every violation found, joined into one message, so the model can
/// fix all of them in its next attempt.
pub fn validate_arguments(schema: &Value, arguments: &Value) -> Result<(), String> {
    if !arguments.is_object() {
        return Err(format!(
            "arguments must be a JSON object, got {}",
            type_name(arguments)
        ));
    }

    let mut errors = Vec::new();
    validate_value(arguments, schema, "", &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors.join("; "))
    }
}

fn validate_value(value: &Value, schema: &Value, path: &str, errors: &mut Vec<String>) {
    let field = if path.is_empty() { "arguments" } else { path };

    if let Some(expected) = schema.get("type") {
        let matches = match expected {
            Value::String(t) => type_matches(value, t),
            Value::Array(types) => types
                .iter()
                .filter_map(Value::as_str)
                .any(|t| type_matches(value, t)),
            _ => true,
        };
        if !matches {
            errors.push(format!(
                "'{}' expected type {}, got {}",
                field,
                expected,
                type_name(value)
            ));
            return;
        }
    }

    if let Some(Value::Array(allowed)) = schema.get("enum")
        && !allowed.contains(value)
    {
        errors.push(format!("'{}' must be one of {}", field, Value::Array(allowed.clone())));
    }

    if let Value::Number(n) = value
        && let Some(num) = n.as_f64()
    {
        if let Some(min) = schema.get("minimum").and_then(Value::as_f64)
            && num < min
        {
            errors.push(format!("'{}' must be >= {}", field, min));
        }
        if let Some(max) = schema.get("maximum").and_then(Value::as_f64)
            && num > max
        {
            errors.push(format!("'{}' must be <= {}", field, max));
        }
    }

    match value {
        Value::Object(obj) => {
            if let Some(Value::Array(required)) = schema.get("required") {
                for key in required.iter().filter_map(Value::as_str) {
                    if !obj.contains_key(key) {
                        errors.push(format!("missing required key '{}'", join(path, key)));
                    }
                }
            }

            let properties = schema.get("properties").and_then(Value::as_object);
            for (key, child) in obj {
                match properties.and_then(|p| p.get(key)) {
                    Some(child_schema) => {
                        validate_value(child, child_schema, &join(path, key), errors)
                    }
                    None => match schema.get("additionalProperties") {
                        Some(Value::Bool(false)) => {
                            errors.push(format!("unexpected key '{}'", join(path, key)));
                        }
                        Some(extra @ Value::Object(_)) => {
                            validate_value(child, extra, &join(path, key), errors)
                        }
                        _ => {}
                    },
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                for (i, item) in items.iter().enumerate() {
                    validate_value(item, item_schema, &format!("{}[{}]", field, i), errors);
                }
            }
        }
        _ => {}
    }
}

fn type_matches(value: &Value, expected: &str) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => {
            value.is_i64()
                || value.is_u64()
                || value
                    .as_f64()
                    .is_some_and(|f| f.is_finite() && f.fract() == 0.0)
        }
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
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

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", path, key)
    }
}
