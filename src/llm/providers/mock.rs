//! Canned completion client for tests and offline demo runs.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde_json::{json, Value};

use crate::errors::EtlError;
use crate::llm::{CompletionClient, Message, Role};

/// Returns configured responses keyed by step name, without any network
/// or subprocess work.
///
/// Steps identify themselves through the `Step: <name>` line their system
/// prompts carry; that line is the lookup key here. `fail_times` makes
/// the first N calls per step return a value that cannot validate, which
/// is how retry behavior is exercised end to end.
pub struct MockClient {
    responses: BTreeMap<String, Value>,
    default_response: Option<Value>,
    fail_times: u32,
    failures: Mutex<BTreeMap<String, u32>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            responses: BTreeMap::new(),
            default_response: None,
            fail_times: 0,
            failures: Mutex::new(BTreeMap::new()),
        }
    }

    /// Set the response for one step.
    pub fn with_response(mut self, step: impl Into<String>, response: Value) -> Self {
        self.responses.insert(step.into(), response);
        self
    }

    /// Fallback response when no per-step response matches.
    pub fn with_default(mut self, response: Value) -> Self {
        self.default_response = Some(response);
        self
    }

    /// Return an invalid value for the first `times` calls of every step.
    pub fn with_fail_times(mut self, times: u32) -> Self {
        self.fail_times = times;
        self
    }

    fn step_name(messages: &[Message]) -> String {
        for message in messages {
            if message.role != Role::System {
                continue;
            }
            for line in message.content.lines() {
                if let Some(name) = line.trim().strip_prefix("Step:") {
                    return name.trim().to_string();
                }
            }
        }
        "unknown_step".to_string()
    }
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionClient for MockClient {
    fn complete(&self, messages: &[Message], _schema: &Value) -> Result<Value, EtlError> {
        let step = Self::step_name(messages);

        let mut failures = self
            .failures
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let seen = failures.entry(step.clone()).or_insert(0);
        if *seen < self.fail_times {
            *seen += 1;
            return Ok(json!({"invalid_field": "this should fail validation"}));
        }
        drop(failures);

        if let Some(response) = self.responses.get(&step) {
            return Ok(response.clone());
        }
        if let Some(response) = &self.default_response {
            return Ok(response.clone());
        }
        Err(EtlError::Completion(format!(
            "no canned response configured for step '{step}'"
        )))
    }
}
