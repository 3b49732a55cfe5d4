//! Model completion boundary.
//!
//! [`CompletionClient`] is the seam between the pipeline and any concrete
//! model transport. A client turns an ordered message list plus a target
//! schema into a value *claimed* to satisfy that schema, or fails with a
//! completion error. No retry, backoff, or validation happens at this
//! boundary; [`retry::RetryingClient`] layers those on top.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EtlError;

pub mod payload_log;
pub mod providers;
pub mod retry;

/// Conversation role tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged conversation message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Raw completion capability.
pub trait CompletionClient {
    /// Send the conversation and target schema, returning the model's
    /// structured value. Errors from this method are transport or
    /// provider failures, never validation failures.
    fn complete(&self, messages: &[Message], schema: &Value) -> Result<Value, EtlError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_serde_uses_snake_case_roles() {
        let message = Message::system("You are a classifier.");
        let encoded = serde_json::to_value(&message).unwrap();
        assert_eq!(encoded["role"], "system");
        assert_eq!(encoded["content"], "You are a classifier.");
    }
}
