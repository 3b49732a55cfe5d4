//! Concrete completion clients.
//!
//! Three providers cover the deployment spectrum: canned responses for
//! tests and demos, a user-configured subprocess command, and an
//! OpenAI-compatible HTTP endpoint.

mod command;
mod http;
mod mock;

pub use command::CommandClient;
pub use http::HttpClient;
pub use mock::MockClient;

use crate::llm::{Message, Role};

/// Render a conversation as a role-tagged transcript for providers that
/// accept plain text.
pub(crate) fn render_transcript(messages: &[Message]) -> String {
    let mut transcript = String::new();
    for message in messages {
        let tag = match message.role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        transcript.push_str(&format!("[{tag}]\n{}\n\n", message.content));
    }
    transcript
}

/// Extract JSON from text that might be wrapped in markdown code fences.
pub(crate) fn extract_json(text: &str) -> &str {
    let text = text.trim();

    if let Some(start) = text.find("```json") {
        let start = start + 7;
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    if let Some(start) = text.find("```") {
        let start = start + 3;
        let start = text[start..]
            .find('\n')
            .map(|offset| start + offset + 1)
            .unwrap_or(start);
        if let Some(end) = text[start..].find("```") {
            return text[start..start + end].trim();
        }
    }

    text
}
