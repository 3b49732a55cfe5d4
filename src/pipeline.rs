//! Pipeline orchestration.
//!
//! Drives records from the source through the step list to the sink,
//! classifying failures and routing them by the configured error policy.
//! Processing is single-threaded and strictly sequential so retry and
//! dead-letter accounting stay ordered per record; an external interrupt
//! is observed between records, never mid-record.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::dead_letter::DeadLetterWriter;
use crate::errors::EtlError;
use crate::llm::retry::RetryingClient;
use crate::record::Record;
use crate::sink::Sink;
use crate::source::Source;
use crate::step::Step;

/// Disposition applied to a failed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Halt the run on the first failure; prior records stay persisted.
    Fail,
    /// Log the failure and continue; no durable trace beyond logs.
    Skip,
    /// Append a diagnostic record to the dead-letter file and continue.
    DeadLetter,
}

/// Lifecycle of one pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Completed,
    Interrupted,
}

/// Metrics returned by a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub success_count: usize,
    pub failure_count: usize,
    pub total_count: usize,
    pub duration: Duration,
    /// Set only when at least one record was dead-lettered.
    pub dead_letter_path: Option<PathBuf>,
}

/// Sequences steps over a source, routing failures per policy.
pub struct Pipeline {
    name: String,
    source: Box<dyn Source>,
    steps: Vec<Box<dyn Step>>,
    sink: Box<dyn Sink>,
    client: RetryingClient,
    policy: ErrorPolicy,
    dead_letter: DeadLetterWriter,
    shutdown: Arc<AtomicBool>,
    state: RunState,
}

/// Sentinel step name used when the sink itself fails.
const SINK_STEP: &str = "sink";

impl Pipeline {
    pub fn new(
        name: impl Into<String>,
        source: Box<dyn Source>,
        steps: Vec<Box<dyn Step>>,
        sink: Box<dyn Sink>,
        client: RetryingClient,
        policy: ErrorPolicy,
        dead_letter: DeadLetterWriter,
    ) -> Self {
        Self {
            name: name.into(),
            source,
            steps,
            sink,
            client,
            policy,
            dead_letter,
            shutdown: Arc::new(AtomicBool::new(false)),
            state: RunState::NotStarted,
        }
    }

    /// Shared flag an external caller can set to request a cooperative
    /// stop after the current record.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Validate configuration without touching a single row.
    pub fn dry_run(&mut self) -> Result<RunResult, EtlError> {
        tracing::info!(pipeline = %self.name, "dry run: validating configuration");

        let row_count = self.source.count()?;
        match row_count {
            Some(rows) => tracing::info!(rows, "source accessible"),
            None => tracing::info!("source accessible (row count unknown)"),
        }

        if self.steps.is_empty() {
            tracing::warn!("no steps configured; pipeline would only copy source to sink");
        } else {
            for step in &self.steps {
                tracing::info!(step = step.name(), output_key = step.output_key(), "step configured");
            }
        }

        tracing::info!(policy = ?self.policy, "error handling configured");
        if self.policy == ErrorPolicy::DeadLetter {
            tracing::info!(path = ?self.dead_letter.path(), "dead-letter destination");
        }
        tracing::info!(
            max_retries = self.client.max_retries(),
            "completion client configured"
        );

        Ok(RunResult {
            success_count: 0,
            failure_count: 0,
            total_count: 0,
            duration: Duration::ZERO,
            dead_letter_path: None,
        })
    }

    /// Process every record from the source. A pipeline runs at most
    /// once; sources are one-pass.
    pub fn run(&mut self) -> Result<RunResult, EtlError> {
        if self.state != RunState::NotStarted {
            return Err(EtlError::Config(format!(
                "pipeline '{}' has already run",
                self.name
            )));
        }
        self.state = RunState::Running;

        let started = Instant::now();
        let total_rows = self.source.count()?;
        match total_rows {
            Some(rows) => tracing::info!(pipeline = %self.name, rows, "pipeline starting"),
            None => tracing::info!(pipeline = %self.name, "pipeline starting (row count unknown)"),
        }

        let mut success_count = 0usize;
        let mut failure_count = 0usize;
        let mut total_count = 0usize;

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                tracing::warn!(
                    pipeline = %self.name,
                    processed = total_count,
                    "interrupt received, stopping after current record"
                );
                self.state = RunState::Interrupted;
                break;
            }

            let Some(mut record) = self.source.next_record()? else {
                self.state = RunState::Completed;
                break;
            };
            total_count += 1;

            match self.process_record(&mut record) {
                Ok(()) => success_count += 1,
                Err(error) => {
                    self.dispatch_failure(&record, error)?;
                    failure_count += 1;
                }
            }

            let cadence = match total_rows {
                Some(rows) => 100.min((rows / 10).max(1)),
                None => 100,
            };
            if total_count % cadence == 0 {
                match total_rows {
                    Some(rows) => tracing::info!(
                        progress = format!("{total_count}/{rows}"),
                        success = success_count,
                        failed = failure_count,
                        "progress"
                    ),
                    None => tracing::info!(
                        rows = total_count,
                        success = success_count,
                        failed = failure_count,
                        "progress"
                    ),
                }
            }
        }

        let duration = started.elapsed();
        tracing::info!(
            pipeline = %self.name,
            success = success_count,
            failed = failure_count,
            total = total_count,
            elapsed_ms = duration.as_millis() as u64,
            "pipeline finished"
        );

        Ok(RunResult {
            success_count,
            failure_count,
            total_count,
            duration,
            dead_letter_path: (failure_count > 0)
                .then(|| self.dead_letter.path().map(PathBuf::from))
                .flatten(),
        })
    }

    /// Run one record through every step and hand it to the sink. Any
    /// failure comes back wrapped with the offending step name and key.
    fn process_record(&mut self, record: &mut Record) -> Result<(), EtlError> {
        for step in &self.steps {
            step.run(record, &self.client)
                .map_err(|error| EtlError::Step {
                    step: step.name().to_string(),
                    key: record.key().to_string(),
                    source: Box::new(error),
                })?;
        }

        record.mark_completed();

        self.sink.write(record).map_err(|error| EtlError::Step {
            step: SINK_STEP.to_string(),
            key: record.key().to_string(),
            source: Box::new(error),
        })
    }

    /// Apply the configured error policy to one failed record.
    fn dispatch_failure(&mut self, record: &Record, error: EtlError) -> Result<(), EtlError> {
        let step = error.step_name().unwrap_or("unknown").to_string();
        match self.policy {
            ErrorPolicy::Fail => {
                tracing::error!(
                    key = record.key(),
                    step = %step,
                    error = %error,
                    "halting pipeline on first failure"
                );
                Err(error)
            }
            ErrorPolicy::Skip => {
                tracing::warn!(key = record.key(), step = %step, error = %error, "skipping record");
                Ok(())
            }
            ErrorPolicy::DeadLetter => {
                tracing::warn!(
                    key = record.key(),
                    step = %step,
                    error = %error,
                    "writing record to dead letter"
                );
                // Dead-letter writes are critical: a failure here halts
                // the run rather than silently dropping the record.
                self.dead_letter.record(record, &error)
            }
        }
    }
}
