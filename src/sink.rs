//! Data sinks.
//!
//! A sink persists enriched records through a column map: named
//! [`FieldRef`] expressions that pull values out of each record. Batch
//! writes are all-or-nothing; every row is extracted and serialized
//! before a single byte reaches the destination.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};

use crate::errors::EtlError;
use crate::extract::InputMap;
use crate::record::Record;

/// A record destination.
pub trait Sink {
    /// Persist one record.
    fn write(&mut self, record: &Record) -> Result<(), EtlError>;

    /// Persist a group of records atomically: all rows commit or none do.
    fn write_batch(&mut self, records: &[Record]) -> Result<(), EtlError>;
}

/// Writes mapped columns as newline-delimited JSON.
///
/// The mutex serializes writers sharing one output file across pipeline
/// instances; each write lands as whole lines appended in one call.
pub struct JsonlSink {
    path: PathBuf,
    columns: InputMap,
    guard: Mutex<()>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>, columns: InputMap) -> Self {
        Self {
            path: path.into(),
            columns,
            guard: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve the column map into one output row. Extraction failures
    /// become sink errors carrying the record's key.
    fn extract_row(&self, record: &Record) -> Result<String, EtlError> {
        let mut row = Map::new();
        for (column, field) in &self.columns {
            let value = field.resolve(record).map_err(|err| EtlError::Sink {
                key: record.key().to_string(),
                message: format!("column '{column}': {err}"),
            })?;
            row.insert(column.clone(), value);
        }
        serde_json::to_string(&Value::Object(row)).map_err(|err| EtlError::Sink {
            key: record.key().to_string(),
            message: format!("serialize row: {err}"),
        })
    }

    fn append(&self, payload: &str, first_key: &str) -> Result<(), EtlError> {
        let _held = self.guard.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let io_err = |err: std::io::Error| EtlError::Sink {
            key: first_key.to_string(),
            message: err.to_string(),
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(io_err)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        file.write_all(payload.as_bytes()).map_err(io_err)
    }
}

impl Sink for JsonlSink {
    fn write(&mut self, record: &Record) -> Result<(), EtlError> {
        let mut line = self.extract_row(record)?;
        line.push('\n');
        self.append(&line, record.key())
    }

    fn write_batch(&mut self, records: &[Record]) -> Result<(), EtlError> {
        if records.is_empty() {
            return Ok(());
        }
        // Extract everything before writing anything.
        let mut payload = String::new();
        for record in records {
            payload.push_str(&self.extract_row(record)?);
            payload.push('\n');
        }
        self.append(&payload, records[0].key())
    }
}
