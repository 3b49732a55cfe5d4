//! The per-row unit of work.
//!
//! Each source row becomes one [`Record`] that travels through the step
//! list, accumulating outputs in `results` while the origin data stays
//! frozen. Origin is captured by value at construction and exposed only
//! behind a shared reference, so mutation after construction is a compile
//! error rather than a runtime check.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single row's journey through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    key: String,
    origin: BTreeMap<String, Value>,
    /// Step outputs keyed by each step's output key.
    #[serde(default)]
    pub results: BTreeMap<String, Value>,
    /// Ordered names of the steps that have completed for this record.
    #[serde(default)]
    pub trace: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Record {
    /// Create a fresh record from a source row. The origin map is owned
    /// from here on; the source keeps no handle to it.
    pub fn new(key: impl Into<String>, origin: BTreeMap<String, Value>) -> Self {
        Self {
            key: key.into(),
            origin,
            results: BTreeMap::new(),
            trace: Vec::new(),
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read-only view of the origin data.
    pub fn origin(&self) -> &BTreeMap<String, Value> {
        &self.origin
    }

    pub fn origin_field(&self, field: &str) -> Option<&Value> {
        self.origin.get(field)
    }

    /// Stamp the completion timestamp as the record exits the pipeline.
    pub fn mark_completed(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    pub fn is_completed(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_origin() -> BTreeMap<String, Value> {
        let mut origin = BTreeMap::new();
        origin.insert("note".to_string(), json!("Patient presents with chest pain"));
        origin.insert("age".to_string(), json!(45));
        origin
    }

    #[test]
    fn new_record_starts_empty() {
        let record = Record::new("enc_001", sample_origin());
        assert_eq!(record.key(), "enc_001");
        assert!(record.results.is_empty());
        assert!(record.trace.is_empty());
        assert!(!record.is_completed());
    }

    #[test]
    fn origin_reads_back_source_values() {
        let record = Record::new("enc_001", sample_origin());
        assert_eq!(
            record.origin_field("note"),
            Some(&json!("Patient presents with chest pain"))
        );
        assert_eq!(record.origin_field("age"), Some(&json!(45)));
        assert_eq!(record.origin_field("missing"), None);
    }

    #[test]
    fn results_and_trace_accumulate() {
        let mut record = Record::new("enc_001", sample_origin());
        record.results.insert(
            "visit_type".to_string(),
            json!({"category": "Emergency", "confidence": 0.92}),
        );
        record.trace.push("visit_classifier".to_string());

        assert_eq!(record.results["visit_type"]["category"], json!("Emergency"));
        assert_eq!(record.trace, vec!["visit_classifier".to_string()]);
    }

    #[test]
    fn mark_completed_sets_timestamp_once() {
        let mut record = Record::new("enc_001", sample_origin());
        record.mark_completed();
        assert!(record.is_completed());
        assert!(record.completed_at.unwrap() >= record.created_at);
    }

    #[test]
    fn json_round_trip_preserves_everything() {
        let mut record = Record::new("enc_001", sample_origin());
        record
            .results
            .insert("summary".to_string(), json!({"text": "Brief summary"}));
        record.trace.push("note_summarizer".to_string());
        record.mark_completed();

        let encoded = serde_json::to_string(&record).unwrap();
        let decoded: Record = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn round_trip_without_completion_timestamp() {
        let record = Record::new("enc_002", sample_origin());
        let encoded = serde_json::to_string(&record).unwrap();
        assert!(!encoded.contains("completed_at"));
        let decoded: Record = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, record);
    }
}
