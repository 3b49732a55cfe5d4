//! Data sources.
//!
//! A source produces a lazy, finite, one-pass sequence of records;
//! restarting a run means acquiring a new source instance. The optional
//! total-count query feeds progress reporting and may answer "unknown".

use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::errors::EtlError;
use crate::record::Record;

/// A finite, one-pass record producer.
pub trait Source {
    /// Fetch the next record, or `None` when the sequence is exhausted.
    fn next_record(&mut self) -> Result<Option<Record>, EtlError>;

    /// Total record count if it can be determined, `None` when unknown.
    fn count(&mut self) -> Result<Option<usize>, EtlError>;
}

/// Reads records from a newline-delimited JSON file.
///
/// Each non-empty line must be a JSON object carrying the configured key
/// field as a non-empty string or number.
pub struct JsonlSource {
    path: PathBuf,
    key_field: String,
    lines: Option<Lines<BufReader<File>>>,
    line_no: usize,
}

impl JsonlSource {
    /// Bind the source to a file; fails fast when the path is not a
    /// readable file so misconfiguration surfaces before iteration.
    pub fn open(path: impl Into<PathBuf>, key_field: impl Into<String>) -> Result<Self, EtlError> {
        let path = path.into();
        if !path.is_file() {
            return Err(EtlError::Source(format!(
                "source file not found: {}",
                path.display()
            )));
        }
        Ok(Self {
            path,
            key_field: key_field.into(),
            lines: None,
            line_no: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record_from_line(&self, line: &str) -> Result<Record, EtlError> {
        let value: Value = serde_json::from_str(line).map_err(|err| {
            EtlError::Source(format!(
                "line {} of {} is not valid JSON: {err}",
                self.line_no,
                self.path.display()
            ))
        })?;
        let Value::Object(fields) = value else {
            return Err(EtlError::Source(format!(
                "line {} of {} is not a JSON object",
                self.line_no,
                self.path.display()
            )));
        };

        let key = match fields.get(&self.key_field) {
            Some(Value::String(key)) if !key.trim().is_empty() => key.clone(),
            Some(Value::Number(key)) => key.to_string(),
            Some(_) | None => {
                return Err(EtlError::Source(format!(
                    "line {} has no usable key in field '{}'",
                    self.line_no, self.key_field
                )))
            }
        };

        Ok(Record::new(key, fields.into_iter().collect()))
    }
}

impl Source for JsonlSource {
    fn next_record(&mut self) -> Result<Option<Record>, EtlError> {
        if self.lines.is_none() {
            let file = File::open(&self.path).map_err(|err| {
                EtlError::Source(format!("open {}: {err}", self.path.display()))
            })?;
            self.lines = Some(BufReader::new(file).lines());
        }
        let Some(lines) = self.lines.as_mut() else {
            return Ok(None);
        };

        loop {
            let Some(line) = lines.next() else {
                return Ok(None);
            };
            self.line_no += 1;
            let line = line.map_err(|err| {
                EtlError::Source(format!(
                    "read line {} of {}: {err}",
                    self.line_no,
                    self.path.display()
                ))
            })?;
            if line.trim().is_empty() {
                continue;
            }
            return self.record_from_line(&line).map(Some);
        }
    }

    fn count(&mut self) -> Result<Option<usize>, EtlError> {
        let file = File::open(&self.path)
            .map_err(|err| EtlError::Source(format!("open {}: {err}", self.path.display())))?;
        let mut total = 0;
        for line in BufReader::new(file).lines() {
            let line = line
                .map_err(|err| EtlError::Source(format!("count {}: {err}", self.path.display())))?;
            if !line.trim().is_empty() {
                total += 1;
            }
        }
        Ok(Some(total))
    }
}
