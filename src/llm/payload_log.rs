//! Completion payload logging.
//!
//! Every completion attempt, success or failure, is appended as one
//! newline-delimited JSON record. This is the only durable trace of what
//! was sent to and received from the model.
//!
//! Writers are injected behind [`AppendSink`] so tests can intercept
//! lines without touching the filesystem, and every file write happens
//! under an exclusive guard so independent pipelines appending to one
//! log cannot interleave partial lines.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EtlError;
use crate::llm::Message;

/// Append-only line writer with atomic per-line writes.
pub trait AppendSink: Send + Sync {
    fn append_line(&self, line: &str) -> io::Result<()>;
}

/// File-backed appender. The file is opened for append on every write so
/// a crashed run never holds a stale handle, and the mutex serializes
/// writers sharing this appender.
pub struct FileAppender {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileAppender {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AppendSink for FileAppender {
    fn append_line(&self, line: &str) -> io::Result<()> {
        let _held = self.guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

/// In-memory appender for tests.
#[derive(Default)]
pub struct MemoryAppender {
    lines: Mutex<Vec<String>>,
}

impl MemoryAppender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl AppendSink for MemoryAppender {
    fn append_line(&self, line: &str) -> io::Result<()> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(line.to_string());
        Ok(())
    }
}

/// One logged completion attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayloadEntry {
    pub timestamp: DateTime<Utc>,
    pub step: String,
    pub key: String,
    pub request: Vec<Message>,
    pub response: Option<Value>,
    /// 0-indexed attempt number within one validated completion.
    pub retry_count: u32,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// Handle for appending payload entries to an injected sink.
#[derive(Clone)]
pub struct PayloadLog {
    sink: Arc<dyn AppendSink>,
}

impl PayloadLog {
    pub fn new(sink: Arc<dyn AppendSink>) -> Self {
        Self { sink }
    }

    /// Log to a jsonl file at the given path.
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(FileAppender::new(path)))
    }

    pub fn append(&self, entry: &PayloadEntry) -> Result<(), EtlError> {
        let line = serde_json::to_string(entry)
            .map_err(|err| EtlError::Config(format!("serialize payload entry: {err}")))?;
        self.sink.append_line(&line)?;
        Ok(())
    }
}
