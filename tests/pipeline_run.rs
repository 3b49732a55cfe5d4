//! End-to-end pipeline runs over real files with the mock provider.

mod common;

use common::{encounter_rows, enrichment_config, read_jsonl, Workspace};

use serde_json::json;

use lm_etl::config::build_pipeline;
use lm_etl::steps::{Category, ClassifyStep};
use lm_etl::{
    DeadLetterWriter, ErrorPolicy, FieldRef, InputMap, JsonlSink, JsonlSource, MockClient,
    PayloadLog, Pipeline, RetryingClient, Step,
};

#[test]
fn enrichment_run_writes_mapped_rows() {
    let workspace = Workspace::with_rows(&encounter_rows(3));
    let mut pipeline = build_pipeline(&enrichment_config(&workspace)).expect("build pipeline");

    let result = pipeline.run().expect("run pipeline");

    assert_eq!(result.total_count, 3);
    assert_eq!(result.success_count, 3);
    assert_eq!(result.failure_count, 0);
    assert!(result.dead_letter_path.is_none());

    let rows = read_jsonl(&workspace.sink_path);
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[0]["encounter_id"], "enc_000");
    assert_eq!(rows[0]["visit_category"], "Emergency");
    assert_eq!(rows[0]["summary_text"], "Chest pain managed with aspirin");
    assert!(!rows[0]["processed_at"].as_str().unwrap().is_empty());

    // One payload entry per step per record, all successful first attempts.
    let attempts = read_jsonl(&workspace.payload_log_path);
    assert_eq!(attempts.len(), 6);
    for attempt in &attempts {
        assert_eq!(attempt["retry_count"], 0);
        assert!(attempt["error"].is_null());
    }
}

#[test]
fn later_step_sees_earlier_step_output() {
    let workspace = Workspace::with_rows(&encounter_rows(1));
    let mut pipeline = build_pipeline(&enrichment_config(&workspace)).expect("build pipeline");
    pipeline.run().expect("run pipeline");

    // The summarizer's focus input is the classifier's category, so its
    // logged request must carry the resolved value.
    let attempts = read_jsonl(&workspace.payload_log_path);
    let summarizer = attempts
        .iter()
        .find(|attempt| attempt["step"] == "note_summarizer")
        .expect("summarizer attempt logged");
    let user_message = summarizer["request"][1]["content"].as_str().unwrap();
    assert!(user_message.contains("Focus area: Emergency"));
}

fn classifier_step() -> Box<dyn Step> {
    let mut inputs = InputMap::new();
    inputs.insert(
        "text".to_string(),
        FieldRef::Origin {
            field: "clinical_notes".to_string(),
        },
    );
    Box::new(
        ClassifyStep::new(
            "visit_classifier",
            vec![Category {
                name: "Emergency".to_string(),
                definition: "Urgent, unplanned visit".to_string(),
            }],
            inputs,
            "visit_type",
        )
        .expect("valid taxonomy"),
    )
}

fn classify_pipeline(
    workspace: &Workspace,
    mock: MockClient,
    max_retries: u32,
    policy: ErrorPolicy,
) -> Pipeline {
    let source =
        JsonlSource::open(&workspace.source_path, "encounter_id").expect("open source");
    let mut columns = InputMap::new();
    columns.insert("encounter_id".to_string(), FieldRef::Key);
    columns.insert(
        "visit_category".to_string(),
        FieldRef::Result {
            step: "visit_type".to_string(),
            field: "category".to_string(),
        },
    );
    let sink = JsonlSink::new(&workspace.sink_path, columns);
    let client = RetryingClient::new(
        Box::new(mock),
        max_retries,
        PayloadLog::to_file(&workspace.payload_log_path),
    );
    Pipeline::new(
        "retry_scenarios",
        Box::new(source),
        vec![classifier_step()],
        Box::new(sink),
        client,
        policy,
        DeadLetterWriter::to_file(&workspace.dead_letter_path),
    )
}

fn valid_classification() -> serde_json::Value {
    json!({"category": "Emergency", "confidence": 0.85, "reasoning": "acute"})
}

#[test]
fn transient_validation_failures_are_absorbed_by_retry_budget() {
    let workspace = Workspace::with_rows(&encounter_rows(3));
    let mock = MockClient::new()
        .with_default(valid_classification())
        .with_fail_times(2);
    let mut pipeline = classify_pipeline(&workspace, mock, 3, ErrorPolicy::Fail);

    let result = pipeline.run().expect("run pipeline");
    assert_eq!(result.success_count, 3);
    assert_eq!(result.failure_count, 0);

    // The two failed attempts still show up in the payload log.
    let attempts = read_jsonl(&workspace.payload_log_path);
    let failed = attempts
        .iter()
        .filter(|attempt| !attempt["error"].is_null())
        .count();
    assert_eq!(failed, 2);
}

#[test]
fn exhausted_retries_dead_letter_every_row() {
    let workspace = Workspace::with_rows(&encounter_rows(3));
    let mock = MockClient::new()
        .with_default(valid_classification())
        .with_fail_times(u32::MAX);
    let mut pipeline = classify_pipeline(&workspace, mock, 2, ErrorPolicy::DeadLetter);

    let result = pipeline.run().expect("run pipeline");
    assert_eq!(result.total_count, 3);
    assert_eq!(result.success_count, 0);
    assert_eq!(result.failure_count, 3);
    assert_eq!(
        result.dead_letter_path.as_deref(),
        Some(workspace.dead_letter_path.as_path())
    );

    let entries = read_jsonl(&workspace.dead_letter_path);
    assert_eq!(entries.len(), 3);
    for entry in &entries {
        assert_eq!(entry["step_name"], "visit_classifier");
        assert_eq!(entry["error_type"], "validation_exhausted");
        assert_eq!(entry["retry_attempts"], 3);
        assert!(entry["raw_data"]["clinical_notes"].is_string());
        assert_eq!(entry["processed_state"], json!({}));
        assert_eq!(entry["steps_completed"], json!([]));
        assert!(entry["timestamp"].is_string());
        assert!(entry["error_message"].is_string());
    }
    assert!(!workspace.sink_path.exists(), "no enriched rows may land");
}

#[test]
fn counters_reconcile_under_skip_policy() {
    let workspace = Workspace::with_rows(&encounter_rows(4));
    let mock = MockClient::new()
        .with_default(valid_classification())
        .with_fail_times(u32::MAX);
    let mut pipeline = classify_pipeline(&workspace, mock, 0, ErrorPolicy::Skip);

    let result = pipeline.run().expect("run pipeline");
    assert_eq!(
        result.success_count + result.failure_count,
        result.total_count
    );
    assert_eq!(result.failure_count, 4);
    assert!(!workspace.dead_letter_path.exists());
}

#[test]
fn dry_run_touches_no_files() {
    let workspace = Workspace::with_rows(&encounter_rows(3));
    let mut pipeline = build_pipeline(&enrichment_config(&workspace)).expect("build pipeline");

    let result = pipeline.dry_run().expect("dry run");

    assert_eq!(result.total_count, 0);
    assert_eq!(result.success_count, 0);
    assert_eq!(result.failure_count, 0);
    assert!(!workspace.sink_path.exists());
    assert!(!workspace.dead_letter_path.exists());
    assert!(!workspace.payload_log_path.exists());
}
