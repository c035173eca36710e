use serde_json::{json, Value};

use crate::types::{GlobalAnnotations, ValueMap};

/// Convert one raw arg/global type descriptor into its canonical shape.
///
/// A bare primitive (`"string"`, `true`, `3`) becomes
/// `{ "name": <key>, "type": { "name": <type name> } }`. An object descriptor
/// passes through field-by-field with `"name"` forced to the key and a
/// bare-string `"type"` field lifted to `{ "name": ... }`.
fn normalize_input_type(key: &str, raw: &Value) -> Value {
    match raw {
        Value::Object(fields) => {
            let mut out = fields.clone();
            out.insert("name".to_string(), Value::String(key.to_string()));
            if let Some(Value::String(type_name)) = fields.get("type") {
                out.insert("type".to_string(), json!({ "name": type_name }));
            }
            Value::Object(out)
        }
        Value::String(type_name) => json!({ "name": key, "type": { "name": type_name } }),
        Value::Bool(_) => json!({ "name": key, "type": { "name": "boolean" } }),
        Value::Number(_) => json!({ "name": key, "type": { "name": "number" } }),
        other => json!({ "name": key, "type": { "name": json_type_name(other) } }),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Normalize a whole map of type descriptors. Idempotent: normalizing an
/// already-normalized map yields the same map.
pub fn normalize_input_types(raw: &ValueMap) -> ValueMap {
    raw.iter()
        .map(|(key, value)| (key.clone(), normalize_input_type(key, value)))
        .collect()
}

/// Normalize the global annotations' `argTypes` and `globalTypes`.
///
/// Runs identically at store construction and on every later
/// `update_global_annotations`.
pub fn normalize_global_annotations(mut annotations: GlobalAnnotations) -> GlobalAnnotations {
    annotations.arg_types = normalize_input_types(&annotations.arg_types);
    annotations.global_types = normalize_input_types(&annotations.global_types);
    annotations
}
