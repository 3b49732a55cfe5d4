//! Pipeline configuration.
//!
//! A run is described by one schema-versioned JSON document: the source,
//! the ordered step list, the sink column map, the completion provider,
//! and the failure policy. Loading and validating the config is separate
//! from building the pipeline so `run --dry-run` and `init` can work
//! without touching providers or data files.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dead_letter::DeadLetterWriter;
use crate::extract::{FieldRef, InputMap};
use crate::llm::payload_log::PayloadLog;
use crate::llm::providers::{CommandClient, HttpClient, MockClient};
use crate::llm::retry::RetryingClient;
use crate::llm::CompletionClient;
use crate::pipeline::{ErrorPolicy, Pipeline};
use crate::sink::JsonlSink;
use crate::source::JsonlSource;
use crate::step::Step;
use crate::steps::{Category, ClassifyStep, SummarizeStep};

/// Current schema version for pipeline config files.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub schema_version: u32,
    pub name: String,
    pub source: SourceConfig,
    pub steps: Vec<StepConfig>,
    pub sink: SinkConfig,
    pub provider: ProviderConfig,
    #[serde(default = "default_policy")]
    pub on_error: ErrorPolicy,
    #[serde(default = "default_dead_letter_path")]
    pub dead_letter_path: PathBuf,
    #[serde(default = "default_payload_log_path")]
    pub payload_log_path: PathBuf,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub path: PathBuf,
    pub key_field: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    pub path: PathBuf,
    pub columns: InputMap,
}

/// One step definition in pipeline order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepConfig {
    Classify {
        name: String,
        taxonomy: Vec<Category>,
        inputs: InputMap,
        output_key: String,
    },
    Summarize {
        name: String,
        rules: Vec<String>,
        inputs: InputMap,
        output_key: String,
    },
}

impl StepConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::Classify { name, .. } => name,
            Self::Summarize { name, .. } => name,
        }
    }

    pub fn output_key(&self) -> &str {
        match self {
            Self::Classify { output_key, .. } => output_key,
            Self::Summarize { output_key, .. } => output_key,
        }
    }
}

/// Completion provider selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Canned responses, for demos and tests.
    Mock {
        #[serde(default)]
        responses: BTreeMap<String, Value>,
        #[serde(default)]
        default_response: Option<Value>,
    },
    /// User-configured subprocess command.
    Command { command: String },
    /// OpenAI-compatible chat endpoint; the key is read from the named
    /// environment variable at build time.
    Http {
        endpoint: String,
        model: String,
        api_key_env: String,
    },
}

fn default_policy() -> ErrorPolicy {
    ErrorPolicy::DeadLetter
}

fn default_dead_letter_path() -> PathBuf {
    PathBuf::from("output/dead_letter.jsonl")
}

fn default_payload_log_path() -> PathBuf {
    PathBuf::from("logs/payloads.jsonl")
}

fn default_max_retries() -> u32 {
    3
}

/// Load a config document from disk.
pub fn load_config(path: &Path) -> Result<PipelineConfig> {
    let bytes = fs::read(path).with_context(|| format!("read config {}", path.display()))?;
    let config: PipelineConfig =
        serde_json::from_slice(&bytes).context("parse pipeline config JSON")?;
    Ok(config)
}

/// Persist a config in a stable JSON format.
pub fn write_config(path: &Path, config: &PipelineConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).context("create config dir")?;
        }
    }
    let text = serde_json::to_string_pretty(config).context("serialize pipeline config")?;
    fs::write(path, text.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Validate schema version and cross-step invariants before any data or
/// provider work happens.
pub fn validate_config(config: &PipelineConfig) -> Result<()> {
    if config.schema_version != CONFIG_SCHEMA_VERSION {
        return Err(anyhow!(
            "unsupported config schema_version {}",
            config.schema_version
        ));
    }
    if config.name.trim().is_empty() {
        return Err(anyhow!("pipeline name must be non-empty"));
    }
    if config.source.key_field.trim().is_empty() {
        return Err(anyhow!("source key_field must be non-empty"));
    }

    let mut names = BTreeSet::new();
    let mut output_keys = BTreeSet::new();
    for step in &config.steps {
        if step.name().trim().is_empty() {
            return Err(anyhow!("step names must be non-empty"));
        }
        if !names.insert(step.name()) {
            return Err(anyhow!("duplicate step name '{}'", step.name()));
        }
        if !output_keys.insert(step.output_key()) {
            return Err(anyhow!("duplicate output key '{}'", step.output_key()));
        }
    }
    Ok(())
}

/// Instantiate the configured provider.
fn build_provider(config: &ProviderConfig) -> Result<Box<dyn CompletionClient>> {
    match config {
        ProviderConfig::Mock {
            responses,
            default_response,
        } => {
            let mut client = MockClient::new();
            for (step, response) in responses {
                client = client.with_response(step, response.clone());
            }
            if let Some(response) = default_response {
                client = client.with_default(response.clone());
            }
            Ok(Box::new(client))
        }
        ProviderConfig::Command { command } => {
            let client = CommandClient::new(command).context("configure command provider")?;
            Ok(Box::new(client))
        }
        ProviderConfig::Http {
            endpoint,
            model,
            api_key_env,
        } => {
            let client =
                HttpClient::new(endpoint, model, api_key_env).context("configure http provider")?;
            Ok(Box::new(client))
        }
    }
}

/// Instantiate one configured step.
fn build_step(config: &StepConfig) -> Result<Box<dyn Step>> {
    match config {
        StepConfig::Classify {
            name,
            taxonomy,
            inputs,
            output_key,
        } => {
            let step = ClassifyStep::new(name, taxonomy.clone(), inputs.clone(), output_key)
                .with_context(|| format!("configure classify step '{name}'"))?;
            Ok(Box::new(step))
        }
        StepConfig::Summarize {
            name,
            rules,
            inputs,
            output_key,
        } => Ok(Box::new(SummarizeStep::new(
            name,
            rules.clone(),
            inputs.clone(),
            output_key,
        ))),
    }
}

/// Build a runnable pipeline from a validated config.
pub fn build_pipeline(config: &PipelineConfig) -> Result<Pipeline> {
    validate_config(config)?;

    let source = JsonlSource::open(&config.source.path, &config.source.key_field)
        .context("configure source")?;

    let steps = config
        .steps
        .iter()
        .map(build_step)
        .collect::<Result<Vec<_>>>()?;

    let sink = JsonlSink::new(&config.sink.path, config.sink.columns.clone());

    let client = RetryingClient::new(
        build_provider(&config.provider)?,
        config.max_retries,
        PayloadLog::to_file(&config.payload_log_path),
    );

    Ok(Pipeline::new(
        &config.name,
        Box::new(source),
        steps,
        Box::new(sink),
        client,
        config.on_error,
        DeadLetterWriter::to_file(&config.dead_letter_path),
    ))
}

/// A worked example config: classify clinic visits, then summarize the
/// note under rules, against the mock provider.
pub fn config_stub() -> PipelineConfig {
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
        "confidence".to_string(),
        FieldRef::Result {
            step: "visit_type".to_string(),
            field: "confidence".to_string(),
        },
    );
    columns.insert(
        "clinical_summary".to_string(),
        FieldRef::Result {
            step: "summary".to_string(),
            field: "text".to_string(),
        },
    );
    columns.insert("processed_at".to_string(), FieldRef::CompletedAt);

    PipelineConfig {
        schema_version: CONFIG_SCHEMA_VERSION,
        name: "patient_visit_enrichment".to_string(),
        source: SourceConfig {
            path: PathBuf::from("data/encounters.jsonl"),
            key_field: "encounter_id".to_string(),
        },
        steps: vec![
            StepConfig::Classify {
                name: "visit_classifier".to_string(),
                taxonomy: vec![
                    Category {
                        name: "Emergency".to_string(),
                        definition: "Urgent, unplanned visit for acute symptoms or trauma"
                            .to_string(),
                    },
                    Category {
                        name: "Routine Checkup".to_string(),
                        definition: "Scheduled preventive care or routine follow-up".to_string(),
                    },
                    Category {
                        name: "Specialist Follow-up".to_string(),
                        definition: "Visit to a specialist based on referral or ongoing treatment"
                            .to_string(),
                    },
                ],
                inputs: classify_inputs,
                output_key: "visit_type".to_string(),
            },
            StepConfig::Summarize {
                name: "note_summarizer".to_string(),
                rules: vec![
                    "Maximum 30 words".to_string(),
                    "Focus on chief complaint and diagnosis".to_string(),
                    "Preserve: medication".to_string(),
                ],
                inputs: summarize_inputs,
                output_key: "summary".to_string(),
            },
        ],
        sink: SinkConfig {
            path: PathBuf::from("output/enriched_encounters.jsonl"),
            columns,
        },
        provider: ProviderConfig::Mock {
            responses: BTreeMap::new(),
            default_response: Some(serde_json::json!({
                "category": "Emergency",
                "confidence": 0.92,
                "reasoning": "Mock classification for testing",
                "text": "Patient with acute condition requiring medication and evaluation.",
                "word_count": 9,
                "rules_applied": ["Maximum 30 words"],
            })),
        },
        on_error: ErrorPolicy::DeadLetter,
        dead_letter_path: default_dead_letter_path(),
        payload_log_path: default_payload_log_path(),
        max_retries: default_max_retries(),
    }
}
