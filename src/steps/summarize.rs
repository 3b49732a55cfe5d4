//! Rule-constrained summarization.
//!
//! Human-authored rule strings ("Maximum 30 words", "Must include:
//! aspirin, dosage") are parsed once into programmatic constraints.
//! Parsing is best-effort by design: rules that match no known pattern
//! add no constraint but still reach the model as prompt guidance, and
//! the recognized/unrecognized split is logged at construction.
//!
//! Word and character counts are recomputed from the returned text; the
//! model's self-reported count is overwritten rather than trusted.

use std::collections::BTreeMap;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EtlError;
use crate::extract::InputMap;
use crate::llm::retry::RetryingClient;
use crate::llm::Message;
use crate::schema::StructuredOutput;
use crate::step::Step;

/// Validated summary result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SummaryOutput {
    /// The summarized text.
    pub text: String,
    /// Word count of the summary; recomputed after validation.
    pub word_count: u32,
    /// Which rules the model says it followed.
    pub rules_applied: Vec<String>,
    /// Explanation of the summarization approach.
    pub reasoning: String,
}

impl StructuredOutput for SummaryOutput {
    fn check(&self) -> Result<(), String> {
        if self.text.trim().is_empty() {
            return Err("summary text cannot be empty".to_string());
        }
        if self.reasoning.trim().is_empty() {
            return Err("reasoning must not be empty".to_string());
        }
        Ok(())
    }
}

/// Constraints extracted from the rule strings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRules {
    pub max_words: Option<usize>,
    pub max_chars: Option<usize>,
    pub required_terms: Vec<String>,
    /// Rules that matched no known pattern; inert but kept for logging.
    pub unrecognized: Vec<String>,
}

impl ParsedRules {
    /// Parse rule strings with fixed patterns (case-insensitive):
    /// `Maximum N words`, `Maximum N characters`, and
    /// `Must include: a, b` / `Preserve: a, b` / `Include: a, b`.
    pub fn parse(rules: &[String]) -> Self {
        let word_ceiling =
            Regex::new(r"(?:maximum|max)\s+(\d+)\s+words?").expect("regex for word ceiling rules");
        let char_ceiling = Regex::new(r"(?:maximum|max)\s+(\d+)\s+(?:characters?|chars?)")
            .expect("regex for character ceiling rules");
        let required = Regex::new(r"(?:must include|preserve|include):\s*(.+)")
            .expect("regex for required term rules");

        let mut parsed = Self::default();
        for rule in rules {
            let lowered = rule.to_lowercase();
            let lowered = lowered.trim();

            if let Some(captures) = char_ceiling.captures(lowered) {
                parsed.max_chars = captures[1].parse().ok();
                continue;
            }
            if let Some(captures) = word_ceiling.captures(lowered) {
                parsed.max_words = captures[1].parse().ok();
                continue;
            }
            if let Some(captures) = required.captures(lowered) {
                parsed.required_terms.extend(
                    captures[1]
                        .split(',')
                        .map(str::trim)
                        .filter(|term| !term.is_empty())
                        .map(String::from),
                );
                continue;
            }
            parsed.unrecognized.push(rule.clone());
        }
        parsed
    }
}

/// Step that reduces text under parsed rule constraints.
pub struct SummarizeStep {
    name: String,
    rules: Vec<String>,
    parsed: ParsedRules,
    inputs: InputMap,
    output_key: String,
}

impl SummarizeStep {
    pub fn new(
        name: impl Into<String>,
        rules: Vec<String>,
        inputs: InputMap,
        output_key: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let parsed = ParsedRules::parse(&rules);
        tracing::debug!(
            step = %name,
            max_words = ?parsed.max_words,
            max_chars = ?parsed.max_chars,
            required_terms = parsed.required_terms.len(),
            "parsed summarization rules"
        );
        if !parsed.unrecognized.is_empty() {
            tracing::warn!(
                step = %name,
                rules = ?parsed.unrecognized,
                "rules without a recognized pattern are prompt-only guidance"
            );
        }
        Self {
            name,
            rules,
            parsed,
            inputs,
            output_key: output_key.into(),
        }
    }

    pub fn parsed_rules(&self) -> &ParsedRules {
        &self.parsed
    }

    fn build_prompt(&self, inputs: &BTreeMap<String, String>) -> Vec<Message> {
        let rules_text = self
            .rules
            .iter()
            .enumerate()
            .map(|(index, rule)| format!("{}. {rule}", index + 1))
            .collect::<Vec<_>>()
            .join("\n");

        let system = format!(
            "You are a precise text summarization system. Summarize the provided \
             text while strictly following ALL rules below.\n\n\
             RULES (you MUST follow every rule):\n{rules_text}\n\n\
             Respond with a JSON object:\n\
             - text: your summarized text\n\
             - word_count: count the words in your summary\n\
             - rules_applied: list which rules you followed\n\
             - reasoning: explain your summarization approach\n\n\
             IMPORTANT: Count your words carefully. If a rule says \
             \"Maximum 50 words\", your summary must have 50 or fewer words.\n\n\
             Step: {}",
            self.name
        );

        let mut user = format!("Text to summarize:\n{}", inputs["text"]);
        if let Some(focus) = inputs.get("focus").filter(|focus| !focus.is_empty()) {
            user.push_str(&format!("\n\nFocus area: {focus}"));
        }

        vec![Message::system(system), Message::user(user)]
    }

    /// Enforce parsed constraints against the returned text, overwriting
    /// the self-reported word count with the recomputed one.
    fn enforce_rules(&self, output: &mut SummaryOutput) -> Result<(), EtlError> {
        let actual_words = output.text.split_whitespace().count();
        output.word_count = actual_words as u32;

        if let Some(max_words) = self.parsed.max_words {
            if actual_words > max_words {
                return Err(EtlError::Rule(format!(
                    "summary has {actual_words} words but maximum is {max_words}"
                )));
            }
        }

        if let Some(max_chars) = self.parsed.max_chars {
            let actual_chars = output.text.chars().count();
            if actual_chars > max_chars {
                return Err(EtlError::Rule(format!(
                    "summary has {actual_chars} characters but maximum is {max_chars}"
                )));
            }
        }

        if !self.parsed.required_terms.is_empty() {
            let lowered = output.text.to_lowercase();
            let missing: Vec<&str> = self
                .parsed
                .required_terms
                .iter()
                .filter(|term| !lowered.contains(term.as_str()))
                .map(String::as_str)
                .collect();
            if !missing.is_empty() {
                return Err(EtlError::Rule(format!(
                    "summary must include these terms: {}",
                    missing.join(", ")
                )));
            }
        }

        Ok(())
    }
}

impl Step for SummarizeStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn output_key(&self) -> &str {
        &self.output_key
    }

    fn inputs(&self) -> &InputMap {
        &self.inputs
    }

    fn execute(
        &self,
        inputs: &BTreeMap<String, String>,
        client: &RetryingClient,
        key: &str,
    ) -> Result<Value, EtlError> {
        let text = inputs.get("text").map(String::as_str).unwrap_or_default();
        if text.trim().is_empty() {
            return Err(EtlError::Rule("cannot summarize empty text".to_string()));
        }

        let messages = self.build_prompt(inputs);
        let mut output: SummaryOutput = client.complete_validated(&messages, &self.name, key)?;
        self.enforce_rules(&mut output)?;

        serde_json::to_value(&output)
            .map_err(|err| EtlError::Config(format!("serialize summary output: {err}")))
    }
}
