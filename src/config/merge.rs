//! Settings layer merge
//!
//! Layers are JSON values applied in order: built-in, config file, CLI.
//! Tables merge by key, arrays and scalars are replaced, and `null` in an
//! overlay means "not set" and leaves the lower layer alone.

use serde_json::Value;

/// Apply `overlay` on top of `base`.
pub fn overlay(base: Value, overlay_value: Value) -> Value {
    match (base, overlay_value) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(existing) => overlay(existing, value),
                    None => value,
                };
                if !merged.is_null() {
                    base_map.insert(key, merged);
                }
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, other) => other,
    }
}

/// Merge layers in order; the last layer has the highest precedence.
pub fn merge_layers(layers: impl IntoIterator<Item = Value>) -> Value {
    layers.into_iter().fold(Value::Null, overlay)
}

/// Convert a parsed TOML document to a JSON layer.
pub fn toml_to_json(toml: toml::Value) -> Value {
    match toml {
        toml::Value::String(s) => Value::String(s),
        toml::Value::Integer(i) => Value::Number(i.into()),
        toml::Value::Float(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        toml::Value::Boolean(b) => Value::Bool(b),
        toml::Value::Datetime(dt) => Value::String(dt.to_string()),
        toml::Value::Array(items) => Value::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Value::Object(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect(),
        ),
    }
}
