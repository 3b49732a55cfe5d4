//! Shared test infrastructure for integration tests.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use tempfile::TempDir;

use lm_etl::config::{
    PipelineConfig, ProviderConfig, SinkConfig, SourceConfig, StepConfig, CONFIG_SCHEMA_VERSION,
};
use lm_etl::steps::Category;
use lm_etl::{ErrorPolicy, FieldRef, InputMap};

/// Temp workspace holding a seeded source file plus the paths every run
/// artifact lands at.
pub struct Workspace {
    #[allow(dead_code)]
    dir: TempDir,
    pub source_path: PathBuf,
    pub sink_path: PathBuf,
    pub dead_letter_path: PathBuf,
    pub payload_log_path: PathBuf,
}

impl Workspace {
    /// Create a workspace with the given rows written as the jsonl source.
    pub fn with_rows(rows: &[Value]) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let source_path = dir.path().join("encounters.jsonl");
        let mut file = File::create(&source_path).expect("create source file");
        for row in rows {
            writeln!(file, "{row}").expect("write source row");
        }
        Self {
            source_path,
            sink_path: dir.path().join("enriched.jsonl"),
            dead_letter_path: dir.path().join("dead_letter.jsonl"),
            payload_log_path: dir.path().join("payloads.jsonl"),
            dir,
        }
    }
}

/// Clinical-note rows in the shape the demo pipeline expects.
pub fn encounter_rows(count: usize) -> Vec<Value> {
    (0..count)
        .map(|index| {
            json!({
                "encounter_id": format!("enc_{index:03}"),
                "clinical_notes": format!(
                    "Patient {index} presents with chest pain, given aspirin 325mg"
                ),
                "department": "Emergency",
                "age": 40 + index,
            })
        })
        .collect()
}

/// A two-step classify-then-summarize pipeline over the workspace files,
/// with per-step mock responses that satisfy every configured rule.
pub fn enrichment_config(workspace: &Workspace) -> PipelineConfig {
    let mut classify_inputs = InputMap::new();
    classify_inputs.insert(
        "text".to_string(),
        FieldRef::Origin {
            field: "clinical_notes".to_string(),
        },
    );
    classify_inputs.insert(
        "context".to_string(),
        FieldRef::Template {
            template: "Department: {department}, Age: {age}".to_string(),
        },
    );

    let mut summarize_inputs = InputMap::new();
    summarize_inputs.insert(
        "text".to_string(),
        FieldRef::Origin {
            field: "clinical_notes".to_string(),
        },
    );
    summarize_inputs.insert(
        "focus".to_string(),
        FieldRef::Result {
            step: "visit_type".to_string(),
            field: "category".to_string(),
        },
    );

    let mut columns = InputMap::new();
    columns.insert("encounter_id".to_string(), FieldRef::Key);
    columns.insert(
        "visit_category".to_string(),
        FieldRef::Result {
            step: "visit_type".to_string(),
            field: "category".to_string(),
        },
    );
    columns.insert(
        "summary_text".to_string(),
        FieldRef::Result {
            step: "summary".to_string(),
            field: "text".to_string(),
        },
    );
    columns.insert("processed_at".to_string(), FieldRef::CompletedAt);

    let mut responses = std::collections::BTreeMap::new();
    responses.insert(
        "visit_classifier".to_string(),
        json!({
            "category": "Emergency",
            "confidence": 0.91,
            "reasoning": "Acute chest pain presentation",
        }),
    );
    responses.insert(
        "note_summarizer".to_string(),
        json!({
            "text": "Chest pain managed with aspirin",
            "word_count": 5,
            "rules_applied": ["Maximum 30 words", "Must include: aspirin"],
            "reasoning": "Kept the chief complaint and medication",
        }),
    );

    PipelineConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        name: "test_enrichment".to_string(),
        source: SourceConfig {
            path: workspace.source_path.clone(),
            key_field: "encounter_id".to_string(),
        },
        steps: vec![
            StepConfig::Classify {
                name: "visit_classifier".to_string(),
                taxonomy: vec![
                    Category {
                        name: "Emergency".to_string(),
                        definition: "Urgent, unplanned visit for acute symptoms".to_string(),
                    },
                    Category {
                        name: "Routine Checkup".to_string(),
                        definition: "Scheduled preventive care".to_string(),
                    },
                ],
                inputs: classify_inputs,
                output_key: "visit_type".to_string(),
            },
            StepConfig::Summarize {
                name: "note_summarizer".to_string(),
                rules: vec![
                    "Maximum 30 words".to_string(),
                    "Must include: aspirin".to_string(),
                ],
                inputs: summarize_inputs,
                output_key: "summary".to_string(),
            },
        ],
        sink: SinkConfig {
            path: workspace.sink_path.clone(),
            columns,
        },
        provider: ProviderConfig::Mock {
            responses,
            default_response: None,
        },
        on_error: ErrorPolicy::DeadLetter,
        dead_letter_path: workspace.dead_letter_path.clone(),
        payload_log_path: workspace.payload_log_path.clone(),
        max_retries: 3,
    }
}

/// Parse every line of a jsonl file.
pub fn read_jsonl(path: &Path) -> Vec<Value> {
    std::fs::read_to_string(path)
        .expect("read jsonl file")
        .lines()
        .map(|line| serde_json::from_str(line).expect("parse jsonl line"))
        .collect()
}
