//! Field extraction from records.
//!
//! Steps and sinks never touch record internals directly; they declare
//! [`FieldRef`] expressions that resolve against a [`Record`]. Each
//! expression is a pure function of the record, so input maps stay
//! serializable and reusable across pipelines with different source
//! shapes.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EtlError;
use crate::record::Record;

/// Named extraction expressions, keyed by the parameter or column name
/// they populate.
pub type InputMap = BTreeMap<String, FieldRef>;

/// A single extraction expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldRef {
    /// The record key.
    Key,
    /// An origin column, as captured at ingestion.
    Origin { field: String },
    /// A field of a previous step's output.
    Result { step: String, field: String },
    /// A text template with `{field}` placeholders resolved from origin.
    Template { template: String },
    /// ISO-8601 completion timestamp, empty until the record completes.
    CompletedAt,
}

impl FieldRef {
    /// Resolve this expression against a record.
    pub fn resolve(&self, record: &Record) -> Result<Value, EtlError> {
        match self {
            Self::Key => Ok(Value::String(record.key().to_string())),
            Self::Origin { field } => record.origin_field(field).cloned().ok_or_else(|| {
                EtlError::Extract(format!("origin field '{field}' not present on record"))
            }),
            Self::Result { step, field } => {
                let output = record.results.get(step).ok_or_else(|| {
                    EtlError::Extract(format!("no output recorded under key '{step}'"))
                })?;
                output.get(field).cloned().ok_or_else(|| {
                    EtlError::Extract(format!("output '{step}' has no field '{field}'"))
                })
            }
            Self::Template { template } => {
                Ok(Value::String(render_template(template, record)?))
            }
            Self::CompletedAt => Ok(Value::String(
                record
                    .completed_at
                    .map(|at| at.to_rfc3339())
                    .unwrap_or_default(),
            )),
        }
    }

    /// Resolve to the string form used for prompt assembly.
    pub fn resolve_string(&self, record: &Record) -> Result<String, EtlError> {
        Ok(value_to_string(&self.resolve(record)?))
    }
}

/// Substitute `{field}` placeholders with origin values. Unknown fields
/// are an extraction error, not silently blank.
fn render_template(template: &str, record: &Record) -> Result<String, EtlError> {
    let placeholder = Regex::new(r"\{([A-Za-z0-9_]+)\}").expect("regex for template placeholders");
    let mut rendered = String::with_capacity(template.len());
    let mut cursor = 0;
    for captures in placeholder.captures_iter(template) {
        let whole = captures.get(0).unwrap();
        let field = &captures[1];
        let value = record.origin_field(field).ok_or_else(|| {
            EtlError::Extract(format!("template field '{field}' not present on record"))
        })?;
        rendered.push_str(&template[cursor..whole.start()]);
        rendered.push_str(&value_to_string(value));
        cursor = whole.end();
    }
    rendered.push_str(&template[cursor..]);
    Ok(rendered)
}

/// Render a JSON value as prompt-friendly text. Strings pass through
/// unquoted; everything else uses its JSON form.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Resolve every expression in an input map into a keyed string bundle.
pub fn resolve_inputs(
    inputs: &InputMap,
    record: &Record,
) -> Result<BTreeMap<String, String>, EtlError> {
    inputs
        .iter()
        .map(|(name, field)| Ok((name.clone(), field.resolve_string(record)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_record() -> Record {
        let mut origin = BTreeMap::new();
        origin.insert("note".to_string(), json!("Routine checkup, no complaints"));
        origin.insert("department".to_string(), json!("Primary Care"));
        origin.insert("age".to_string(), json!(45));
        let mut record = Record::new("enc_007", origin);
        record.results.insert(
            "visit_type".to_string(),
            json!({"category": "Routine Checkup", "confidence": 0.88}),
        );
        record
    }

    #[test]
    fn key_and_origin_resolve() {
        let record = sample_record();
        assert_eq!(FieldRef::Key.resolve(&record).unwrap(), json!("enc_007"));
        let origin = FieldRef::Origin {
            field: "note".to_string(),
        };
        assert_eq!(
            origin.resolve_string(&record).unwrap(),
            "Routine checkup, no complaints"
        );
    }

    #[test]
    fn result_field_resolves_from_previous_step() {
        let record = sample_record();
        let field = FieldRef::Result {
            step: "visit_type".to_string(),
            field: "category".to_string(),
        };
        assert_eq!(field.resolve(&record).unwrap(), json!("Routine Checkup"));
    }

    #[test]
    fn missing_origin_field_is_an_extract_error() {
        let record = sample_record();
        let field = FieldRef::Origin {
            field: "gender".to_string(),
        };
        let err = field.resolve(&record).unwrap_err();
        assert_eq!(err.kind(), "extract");
        assert!(err.to_string().contains("gender"));
    }

    #[test]
    fn template_substitutes_origin_values() {
        let record = sample_record();
        let field = FieldRef::Template {
            template: "Department: {department}, Age: {age}".to_string(),
        };
        assert_eq!(
            field.resolve_string(&record).unwrap(),
            "Department: Primary Care, Age: 45"
        );
    }

    #[test]
    fn template_with_unknown_field_fails() {
        let record = sample_record();
        let field = FieldRef::Template {
            template: "Gender: {gender}".to_string(),
        };
        assert!(field.resolve(&record).is_err());
    }

    #[test]
    fn completed_at_is_empty_until_completion() {
        let mut record = sample_record();
        assert_eq!(FieldRef::CompletedAt.resolve(&record).unwrap(), json!(""));
        record.mark_completed();
        let rendered = FieldRef::CompletedAt.resolve_string(&record).unwrap();
        assert!(!rendered.is_empty());
    }

    #[test]
    fn input_map_resolves_in_bulk() {
        let record = sample_record();
        let mut inputs = InputMap::new();
        inputs.insert(
            "text".to_string(),
            FieldRef::Origin {
                field: "note".to_string(),
            },
        );
        inputs.insert(
            "focus".to_string(),
            FieldRef::Result {
                step: "visit_type".to_string(),
                field: "category".to_string(),
            },
        );
        let resolved = resolve_inputs(&inputs, &record).unwrap();
        assert_eq!(resolved["text"], "Routine checkup, no complaints");
        assert_eq!(resolved["focus"], "Routine Checkup");
    }

    #[test]
    fn field_ref_serde_shape() {
        let field = FieldRef::Origin {
            field: "note".to_string(),
        };
        let encoded = serde_json::to_value(&field).unwrap();
        assert_eq!(encoded, json!({"origin": {"field": "note"}}));

        let decoded: FieldRef = serde_json::from_value(json!("key")).unwrap();
        assert_eq!(decoded, FieldRef::Key);
    }
}
