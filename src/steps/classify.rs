//! Taxonomy-constrained classification.
//!
//! The model sees the full taxonomy with definitions and must answer
//! with one of the listed names. Membership is checked after the
//! schema-valid response returns, as a business rule: an out-of-taxonomy
//! category is routed by the error policy, not fed back into the retry
//! conversation.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EtlError;
use crate::extract::InputMap;
use crate::llm::retry::RetryingClient;
use crate::llm::Message;
use crate::schema::StructuredOutput;
use crate::step::Step;

/// One category in a classification taxonomy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub definition: String,
}

/// A validated, ordered category list.
///
/// Names are unique and the list is non-empty; both are enforced at
/// construction so a malformed taxonomy can never reach a run.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    categories: Vec<Category>,
}

impl Taxonomy {
    pub fn new(categories: Vec<Category>) -> Result<Self, EtlError> {
        if categories.is_empty() {
            return Err(EtlError::Config("taxonomy cannot be empty".to_string()));
        }
        let mut seen = BTreeSet::new();
        for category in &categories {
            if !seen.insert(category.name.as_str()) {
                return Err(EtlError::Config(format!(
                    "taxonomy contains duplicate category name '{}'",
                    category.name
                )));
            }
        }
        Ok(Self { categories })
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn contains(&self, name: &str) -> bool {
        self.categories.iter().any(|category| category.name == name)
    }

    /// Sorted category names, as shown to the model.
    pub fn sorted_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .categories
            .iter()
            .map(|category| category.name.as_str())
            .collect();
        names.sort_unstable();
        names
    }
}

/// Validated classification result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClassificationOutput {
    /// The assigned category; must match a taxonomy name exactly.
    pub category: String,
    /// Model confidence in the assignment.
    pub confidence: f64,
    /// Explanation of the classification decision.
    pub reasoning: String,
}

impl StructuredOutput for ClassificationOutput {
    fn check(&self) -> Result<(), String> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(format!(
                "confidence must be between 0.0 and 1.0, got {}",
                self.confidence
            ));
        }
        if self.reasoning.trim().is_empty() {
            return Err("reasoning must not be empty".to_string());
        }
        Ok(())
    }
}

/// Step that classifies text into taxonomy categories.
pub struct ClassifyStep {
    name: String,
    taxonomy: Taxonomy,
    inputs: InputMap,
    output_key: String,
}

impl ClassifyStep {
    /// Build the step; fails on an empty taxonomy or duplicate names.
    pub fn new(
        name: impl Into<String>,
        categories: Vec<Category>,
        inputs: InputMap,
        output_key: impl Into<String>,
    ) -> Result<Self, EtlError> {
        Ok(Self {
            name: name.into(),
            taxonomy: Taxonomy::new(categories)?,
            inputs,
            output_key: output_key.into(),
        })
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    fn build_prompt(&self, inputs: &BTreeMap<String, String>) -> Result<Vec<Message>, EtlError> {
        let text = inputs.get("text").ok_or_else(|| {
            EtlError::Extract("classification input map must provide 'text'".to_string())
        })?;

        let taxonomy_lines = self
            .taxonomy
            .categories()
            .iter()
            .map(|category| format!("- {}: {}", category.name, category.definition))
            .collect::<Vec<_>>()
            .join("\n");
        let valid_names = serde_json::to_string(&self.taxonomy.sorted_names())
            .map_err(|err| EtlError::Config(format!("serialize taxonomy names: {err}")))?;

        let system = format!(
            "You are a precise classification system. Classify the provided text \
             into exactly one category from the taxonomy below.\n\n\
             TAXONOMY:\n{taxonomy_lines}\n\n\
             VALID CATEGORY NAMES (you MUST use one of these exactly):\n{valid_names}\n\n\
             Respond with a JSON object matching this schema:\n\
             - category: string (must be one of the valid names above)\n\
             - confidence: number between 0.0 and 1.0\n\
             - reasoning: string explaining your classification decision\n\n\
             Step: {}",
            self.name
        );

        let mut user = format!("Text to classify:\n{text}");
        if let Some(context) = inputs.get("context").filter(|context| !context.is_empty()) {
            user.push_str(&format!("\n\nAdditional context:\n{context}"));
        }

        Ok(vec![Message::system(system), Message::user(user)])
    }
}

impl Step for ClassifyStep {
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
        let messages = self.build_prompt(inputs)?;
        let output: ClassificationOutput =
            client.complete_validated(&messages, &self.name, key)?;

        if !self.taxonomy.contains(&output.category) {
            return Err(EtlError::Rule(format!(
                "invalid category '{}'; must be one of: {:?}",
                output.category,
                self.taxonomy.sorted_names()
            )));
        }

        serde_json::to_value(&output)
            .map_err(|err| EtlError::Config(format!("serialize classification output: {err}")))
    }
}
