//! The step abstraction.
//!
//! A step is a named transformation bound to records only through its
//! input map and output key. `execute` receives the already-extracted
//! input bundle, never the record itself, so concrete steps can be
//! reused across pipelines whose sources have different shapes.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::errors::EtlError;
use crate::extract::{resolve_inputs, InputMap};
use crate::llm::retry::RetryingClient;
use crate::record::Record;

/// A named, reusable transformation over records.
pub trait Step {
    /// Unique name within a pipeline, used for logging and error context.
    fn name(&self) -> &str;

    /// Slot in `results` where this step's output lands.
    fn output_key(&self) -> &str;

    /// The input-extraction contract for this step.
    fn inputs(&self) -> &InputMap;

    /// Transform the extracted input bundle into a structured output.
    fn execute(
        &self,
        inputs: &BTreeMap<String, String>,
        client: &RetryingClient,
        key: &str,
    ) -> Result<Value, EtlError>;

    /// Drive one record through this step: resolve inputs, execute, store
    /// the output, and append to the trace. Errors propagate unwrapped;
    /// the orchestrator adds row and step context.
    fn run(&self, record: &mut Record, client: &RetryingClient) -> Result<(), EtlError> {
        let inputs = resolve_inputs(self.inputs(), record)?;
        let output = self.execute(&inputs, client, record.key())?;
        record
            .results
            .insert(self.output_key().to_string(), output);
        record.trace.push(self.name().to_string());
        Ok(())
    }
}
