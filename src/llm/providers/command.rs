//! Subprocess completion client.
//!
//! Delegates completion to a user-configured command instead of binding
//! to one provider: any tool that reads a transcript on stdin and prints
//! a JSON object works (`llm`, `ollama run`, custom scripts). A `{schema}`
//! placeholder in the command line is substituted with the target schema
//! before spawning.

use std::io::Write;
use std::process::{Command, Stdio};
use std::time::Instant;

use serde_json::Value;

use crate::errors::EtlError;
use crate::llm::providers::{extract_json, render_transcript};
use crate::llm::{CompletionClient, Message};

/// Completion client that shells out to a configured command.
pub struct CommandClient {
    argv: Vec<String>,
}

impl CommandClient {
    /// Parse the configured command line. Fails on empty or unparseable
    /// commands so a misconfiguration surfaces before the first record.
    pub fn new(command: &str) -> Result<Self, EtlError> {
        let argv = shell_words::split(command)
            .map_err(|err| EtlError::Config(format!("parse completion command: {err}")))?;
        if argv.is_empty() {
            return Err(EtlError::Config("completion command is empty".to_string()));
        }
        Ok(Self { argv })
    }
}

impl CompletionClient for CommandClient {
    fn complete(&self, messages: &[Message], schema: &Value) -> Result<Value, EtlError> {
        let schema_text = serde_json::to_string(schema)
            .map_err(|err| EtlError::Completion(format!("serialize schema: {err}")))?;
        let mut argv = self.argv.clone();
        for arg in &mut argv {
            if arg == "{schema}" {
                *arg = schema_text.clone();
            }
        }

        let prompt = render_transcript(messages);
        let start = Instant::now();
        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| EtlError::Completion(format!("spawn '{}': {err}", argv[0])))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .map_err(|err| EtlError::Completion(format!("write prompt to stdin: {err}")))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|err| EtlError::Completion(format!("wait for completion command: {err}")))?;

        tracing::debug!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            prompt_bytes = prompt.len(),
            response_bytes = output.stdout.len(),
            "completion command finished"
        );

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EtlError::Completion(format!(
                "command exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|err| EtlError::Completion(format!("decode stdout as UTF-8: {err}")))?;
        serde_json::from_str(extract_json(&stdout)).map_err(|err| {
            EtlError::Completion(format!(
                "command output is not JSON: {err} (first 200 chars: {})",
                &stdout[..stdout.len().min(200)]
            ))
        })
    }
}
