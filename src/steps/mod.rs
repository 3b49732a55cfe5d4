//! Concrete pipeline steps.

mod classify;
mod summarize;

pub use classify::{Category, ClassificationOutput, ClassifyStep, Taxonomy};
pub use summarize::{ParsedRules, SummarizeStep, SummaryOutput};
