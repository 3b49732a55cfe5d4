//! Error taxonomy for pipeline execution.
//!
//! Each variant corresponds to one failure class the orchestrator can
//! classify and route: completion transport failures, validation
//! exhaustion, business-rule violations, extraction failures, and
//! source/sink boundary errors.

use std::io;

use thiserror::Error;

/// Error type covering every failure class the pipeline routes.
#[derive(Debug, Error)]
pub enum EtlError {
    /// The underlying completion capability failed (transport, provider,
    /// subprocess). Never retried by the validation layer.
    #[error("completion failed: {0}")]
    Completion(String),

    /// Model output failed schema validation after exhausting the retry
    /// budget. Carries every validation message in attempt order.
    #[error("step '{step}' validation failed for key '{key}' after {attempts} attempts: {}", .errors.join("; "))]
    ValidationExhausted {
        step: String,
        key: String,
        errors: Vec<String>,
        attempts: u32,
    },

    /// Schema-valid output violated a domain constraint (taxonomy
    /// membership, length ceiling, required term).
    #[error("business rule violated: {0}")]
    Rule(String),

    /// An input or column extractor could not resolve against a record.
    #[error("extraction failed: {0}")]
    Extract(String),

    /// Reading from the data source failed. No record key: the failure
    /// happens before a record exists.
    #[error("source error: {0}")]
    Source(String),

    /// Writing to the sink failed for a specific record.
    #[error("failed to write key '{key}' to sink: {message}")]
    Sink { key: String, message: String },

    /// A step failed while processing a record; wraps the underlying
    /// cause with step and record context. The orchestrator uses the
    /// sentinel step name `sink` for sink-originated failures.
    #[error("step '{step}' failed for key '{key}': {source}")]
    Step {
        step: String,
        key: String,
        #[source]
        source: Box<EtlError>,
    },

    /// Invalid pipeline or provider configuration.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl EtlError {
    /// Snake-case tag identifying the failure class, as written into
    /// dead-letter records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Completion(_) => "completion",
            Self::ValidationExhausted { .. } => "validation_exhausted",
            Self::Rule(_) => "rule",
            Self::Extract(_) => "extract",
            Self::Source(_) => "source",
            Self::Sink { .. } => "sink",
            Self::Step { .. } => "step",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
        }
    }

    /// The failing step name, looking through the step wrapper.
    pub fn step_name(&self) -> Option<&str> {
        match self {
            Self::Step { step, .. } => Some(step),
            Self::ValidationExhausted { step, .. } => Some(step),
            _ => None,
        }
    }

    /// Underlying cause with the step wrapper removed.
    pub fn root(&self) -> &EtlError {
        match self {
            Self::Step { source, .. } => source.root(),
            other => other,
        }
    }

    /// Retry attempts consumed before this failure; zero unless the root
    /// cause is a validation exhaustion.
    pub fn retry_attempts(&self) -> u32 {
        match self.root() {
            Self::ValidationExhausted { attempts, .. } => *attempts,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_wrapper_exposes_root_cause() {
        let inner = EtlError::ValidationExhausted {
            step: "classifier".to_string(),
            key: "enc_1".to_string(),
            errors: vec!["missing field `category`".to_string()],
            attempts: 4,
        };
        let wrapped = EtlError::Step {
            step: "classifier".to_string(),
            key: "enc_1".to_string(),
            source: Box::new(inner),
        };

        assert_eq!(wrapped.kind(), "step");
        assert_eq!(wrapped.root().kind(), "validation_exhausted");
        assert_eq!(wrapped.retry_attempts(), 4);
        assert_eq!(wrapped.step_name(), Some("classifier"));
    }

    #[test]
    fn retry_attempts_zero_for_rule_failures() {
        let err = EtlError::Step {
            step: "summarizer".to_string(),
            key: "enc_2".to_string(),
            source: Box::new(EtlError::Rule("too many words".to_string())),
        };
        assert_eq!(err.retry_attempts(), 0);
    }

    #[test]
    fn display_includes_step_and_key() {
        let err = EtlError::Step {
            step: "sink".to_string(),
            key: "enc_3".to_string(),
            source: Box::new(EtlError::Sink {
                key: "enc_3".to_string(),
                message: "disk full".to_string(),
            }),
        };
        let rendered = err.to_string();
        assert!(rendered.contains("step 'sink'"));
        assert!(rendered.contains("enc_3"));
        assert!(rendered.contains("disk full"));
    }
}
