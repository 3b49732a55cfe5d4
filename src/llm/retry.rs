//! Retry-with-error-feedback around a raw completion client.
//!
//! Structured-output failures are often self-correctable once the model
//! sees its own mistake, so each validation failure is appended to the
//! conversation as a user message before the next attempt. The attempt
//! budget is `max_retries + 1` total calls; transport errors are never
//! retried here (transient-error policy belongs to the underlying
//! transport).

use std::time::Instant;

use chrono::Utc;
use serde_json::Value;

use crate::errors::EtlError;
use crate::llm::payload_log::{PayloadEntry, PayloadLog};
use crate::llm::{CompletionClient, Message};
use crate::schema::StructuredOutput;

/// Completion client with schema validation and feedback retries.
pub struct RetryingClient {
    inner: Box<dyn CompletionClient>,
    max_retries: u32,
    log: PayloadLog,
}

impl RetryingClient {
    pub fn new(inner: Box<dyn CompletionClient>, max_retries: u32, log: PayloadLog) -> Self {
        Self {
            inner,
            max_retries,
            log,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Complete the conversation and validate the response against `T`.
    ///
    /// The caller's message list is never mutated; feedback messages are
    /// appended to an internal copy. Every attempt is logged, whatever
    /// its outcome.
    pub fn complete_validated<T: StructuredOutput>(
        &self,
        messages: &[Message],
        step_name: &str,
        key: &str,
    ) -> Result<T, EtlError> {
        let schema = T::schema();
        let mut conversation = messages.to_vec();
        let mut failures: Vec<String> = Vec::new();

        for attempt in 0..=self.max_retries {
            let start = Instant::now();
            let value = match self.inner.complete(&conversation, &schema) {
                Ok(value) => value,
                Err(err) => {
                    self.log_attempt(
                        step_name,
                        key,
                        &conversation,
                        None,
                        attempt,
                        start,
                        Some(err.to_string()),
                    )?;
                    return Err(err);
                }
            };

            match parse_validated::<T>(&value) {
                Ok(output) => {
                    self.log_attempt(
                        step_name,
                        key,
                        &conversation,
                        Some(value),
                        attempt,
                        start,
                        None,
                    )?;
                    if attempt > 0 {
                        tracing::info!(step = step_name, key, attempt, "validation retry succeeded");
                    }
                    return Ok(output);
                }
                Err(message) => {
                    self.log_attempt(
                        step_name,
                        key,
                        &conversation,
                        None,
                        attempt,
                        start,
                        Some(message.clone()),
                    )?;
                    tracing::warn!(
                        step = step_name,
                        key,
                        attempt,
                        error = %message,
                        "model output failed validation"
                    );
                    failures.push(message.clone());
                    if attempt < self.max_retries {
                        conversation.push(Message::user(format!(
                            "Your previous response failed validation: {message}. \
                             Please fix and try again."
                        )));
                    }
                }
            }
        }

        Err(EtlError::ValidationExhausted {
            step: step_name.to_string(),
            key: key.to_string(),
            errors: failures,
            attempts: self.max_retries + 1,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn log_attempt(
        &self,
        step: &str,
        key: &str,
        request: &[Message],
        response: Option<Value>,
        attempt: u32,
        start: Instant,
        error: Option<String>,
    ) -> Result<(), EtlError> {
        self.log.append(&PayloadEntry {
            timestamp: Utc::now(),
            step: step.to_string(),
            key: key.to_string(),
            request: request.to_vec(),
            response,
            retry_count: attempt,
            latency_ms: start.elapsed().as_millis() as u64,
            error,
        })
    }
}

/// Deserialize and constraint-check a claimed value.
fn parse_validated<T: StructuredOutput>(value: &Value) -> Result<T, String> {
    let output: T = serde_json::from_value(value.clone())
        .map_err(|err| format!("response does not match the expected schema: {err}"))?;
    output.check()?;
    Ok(output)
}
