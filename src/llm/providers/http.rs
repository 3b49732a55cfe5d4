//! OpenAI-compatible HTTP completion client.
//!
//! Speaks the chat-completions wire format with a strict `json_schema`
//! response format, so the provider enforces the schema server-side and
//! the validation layer only has to confirm it. Credentials come from an
//! environment variable named in the pipeline configuration; the core
//! pipeline itself never reads the process environment.

use std::env;

use serde_json::{json, Value};

use crate::errors::EtlError;
use crate::llm::providers::extract_json;
use crate::llm::{CompletionClient, Message};

/// Completion client for OpenAI-compatible chat endpoints.
pub struct HttpClient {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
    api_key: String,
}

impl HttpClient {
    /// Build a client, resolving the API key from `api_key_env`.
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        api_key_env: &str,
    ) -> Result<Self, EtlError> {
        let api_key = env::var(api_key_env).map_err(|_| {
            EtlError::Config(format!(
                "environment variable '{api_key_env}' is not set (required for the http provider)"
            ))
        })?;
        Ok(Self {
            agent: ureq::Agent::new_with_defaults(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        })
    }
}

impl CompletionClient for HttpClient {
    fn complete(&self, messages: &[Message], schema: &Value) -> Result<Value, EtlError> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "step_output",
                    "strict": true,
                    "schema": schema,
                },
            },
        });

        let mut response = self
            .agent
            .post(&self.endpoint)
            .header("authorization", &format!("Bearer {}", self.api_key))
            .send_json(&body)
            .map_err(|err| EtlError::Completion(format!("completion request failed: {err}")))?;

        let payload: Value = response
            .body_mut()
            .read_json()
            .map_err(|err| EtlError::Completion(format!("read completion response: {err}")))?;

        let content = payload["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| {
                EtlError::Completion("completion response has no message content".to_string())
            })?;

        serde_json::from_str(extract_json(content)).map_err(|err| {
            EtlError::Completion(format!("completion content is not JSON: {err}"))
        })
    }
}
