//! Structured-output schemas for model responses.
//!
//! Output types derive `JsonSchema` and implement [`StructuredOutput`],
//! which produces a strict-mode JSON schema (every property required, no
//! additional properties, no `$ref` indirection) and carries the
//! structural checks serde cannot express on its own.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

/// A model-output type with a strict schema and structural constraints.
///
/// `check` runs inside the validation loop right after deserialization,
/// so range and non-emptiness violations get the same retry-with-feedback
/// treatment as shape mismatches.
pub trait StructuredOutput: Serialize + DeserializeOwned + JsonSchema {
    /// Strict-mode JSON schema for this type.
    fn schema() -> Value {
        let root = schemars::schema_for!(Self);
        let mut value = serde_json::to_value(root).unwrap_or_default();

        let definitions = value
            .as_object()
            .and_then(|map| map.get("definitions"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        inline_definitions(&mut value, &definitions);
        tighten_objects(&mut value);

        if let Value::Object(map) = &mut value {
            map.remove("definitions");
            map.remove("$schema");
        }
        value
    }

    /// Structural constraints beyond type shape. The error string is fed
    /// back to the model verbatim on retry.
    fn check(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Replace every `$ref` into `#/definitions/` with the referenced schema.
/// Strict providers do not follow references, so the schema must arrive
/// fully expanded.
fn inline_definitions(value: &mut Value, definitions: &Map<String, Value>) {
    match value {
        Value::Object(map) => {
            let referenced = map
                .get("$ref")
                .and_then(Value::as_str)
                .and_then(|path| path.strip_prefix("#/definitions/"))
                .and_then(|name| definitions.get(name))
                .cloned();
            if let Some(mut resolved) = referenced {
                inline_definitions(&mut resolved, definitions);
                *value = resolved;
                return;
            }
            for nested in map.values_mut() {
                inline_definitions(nested, definitions);
            }
        }
        Value::Array(items) => {
            for item in items {
                inline_definitions(item, definitions);
            }
        }
        _ => {}
    }
}

/// Recursively mark object schemas strict: no additional properties, and
/// every declared property listed as required.
fn tighten_objects(value: &mut Value) {
    match value {
        Value::Object(map) => {
            let is_object_schema = map.get("type") == Some(&Value::String("object".to_string()));
            if is_object_schema {
                map.insert("additionalProperties".to_string(), Value::Bool(false));
                if let Some(Value::Object(properties)) = map.get("properties") {
                    let names: Vec<Value> = properties
                        .keys()
                        .map(|name| Value::String(name.clone()))
                        .collect();
                    map.insert("required".to_string(), Value::Array(names));
                }
            }
            for nested in map.values_mut() {
                tighten_objects(nested);
            }
        }
        Value::Array(items) => {
            for item in items {
                tighten_objects(item);
            }
        }
        _ => {}
    }
}
