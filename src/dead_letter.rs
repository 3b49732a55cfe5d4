//! Dead-letter channel for failed records.
//!
//! Each failure becomes one newline-delimited JSON record with enough
//! context to diagnose and replay it: the origin snapshot, everything
//! the steps produced before the failure, the trace, and the retry
//! accounting. Writes are synchronous and immediate so a later crash
//! cannot lose a failure that was already decided.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EtlError;
use crate::llm::payload_log::{AppendSink, FileAppender};
use crate::record::Record;

/// One dead-lettered record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub key: String,
    pub step_name: String,
    pub error_type: String,
    pub error_message: String,
    pub raw_data: BTreeMap<String, Value>,
    pub processed_state: BTreeMap<String, Value>,
    pub steps_completed: Vec<String>,
    pub timestamp: DateTime<Utc>,
    /// Completion attempts consumed when the cause was validation
    /// exhaustion; 0 for every other failure class.
    pub retry_attempts: u32,
}

/// Appends dead-letter entries to an injected sink.
pub struct DeadLetterWriter {
    sink: Arc<dyn AppendSink>,
    path: Option<PathBuf>,
}

impl DeadLetterWriter {
    /// Write to a jsonl file at the given path.
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            sink: Arc::new(FileAppender::new(&path)),
            path: Some(path),
        }
    }

    /// Write to an arbitrary sink (used by tests).
    pub fn to_sink(sink: Arc<dyn AppendSink>) -> Self {
        Self { sink, path: None }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record one failed record. The failing step name is taken from the
    /// error's step wrapper (`sink` for sink-originated failures).
    pub fn record(&self, record: &Record, error: &EtlError) -> Result<(), EtlError> {
        let entry = DeadLetterEntry {
            key: record.key().to_string(),
            step_name: error.step_name().unwrap_or("unknown").to_string(),
            error_type: error.root().kind().to_string(),
            error_message: error.to_string(),
            raw_data: record.origin().clone(),
            processed_state: record.results.clone(),
            steps_completed: record.trace.clone(),
            timestamp: Utc::now(),
            retry_attempts: error.retry_attempts(),
        };
        let line = serde_json::to_string(&entry)
            .map_err(|err| EtlError::Config(format!("serialize dead-letter entry: {err}")))?;
        self.sink.append_line(&line)?;
        Ok(())
    }
}
