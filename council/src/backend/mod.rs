//! Text-generation backends
//!
//! A backend turns a prompt into response text. The contract is fail-soft:
//! an unreachable service or a non-success reply yields an empty string,
//! never an error. Callers treat the empty string as "no contribution".

pub mod ollama;
pub mod scripted;

use async_trait::async_trait;

pub use ollama::{BackendError, OllamaBackend};
pub use scripted::ScriptedBackend;

/// Capability to turn a prompt into response text
#[async_trait]
pub trait Backend: Send + Sync {
    /// Label used in logs and reports (usually the model name)
    fn name(&self) -> &str;

    /// Generate a reply for `prompt`, prefixed by `context` when non-empty.
    ///
    /// Returns the trimmed reply, or an empty string on any failure.
    async fn generate(&self, prompt: &str, context: &str) -> String;
}

/// Join context and prompt with a blank line; context is dropped when empty.
pub fn compose_prompt(prompt: &str, context: &str) -> String {
    if context.is_empty() {
        prompt.to_string()
    } else {
        format!("{}\n\n{}", context, prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compose_without_context() {
        assert_eq!(compose_prompt("analyse this", ""), "analyse this");
    }

    #[test]
    fn test_compose_with_context() {
        assert_eq!(
            compose_prompt("analyse this", "facts"),
            "facts\n\nanalyse this"
        );
    }
}
