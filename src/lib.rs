//! LM-driven record enrichment pipeline.
//!
//! Routes tabular records through a sequence of model-backed
//! transformation steps, validating every model output against a schema
//! plus business rules, and persisting enriched records or, on failure,
//! diagnostic dead-letter records.

pub mod cli;
pub mod config;
pub mod dead_letter;
pub mod errors;
pub mod extract;
pub mod llm;
pub mod pipeline;
pub mod record;
pub mod schema;
pub mod sink;
pub mod source;
pub mod step;
pub mod steps;

pub use dead_letter::{DeadLetterEntry, DeadLetterWriter};
pub use errors::EtlError;
pub use extract::{FieldRef, InputMap};
pub use llm::payload_log::{AppendSink, FileAppender, MemoryAppender, PayloadEntry, PayloadLog};
pub use llm::providers::{CommandClient, HttpClient, MockClient};
pub use llm::retry::RetryingClient;
pub use llm::{CompletionClient, Message, Role};
pub use pipeline::{ErrorPolicy, Pipeline, RunResult, RunState};
pub use record::Record;
pub use schema::StructuredOutput;
pub use sink::{JsonlSink, Sink};
pub use source::{JsonlSource, Source};
pub use step::Step;
pub use steps::{Category, ClassificationOutput, ClassifyStep, SummarizeStep, SummaryOutput};
