//! The `TextGenerator` trait: one attempt against a language model.
//!
//! Retries, timeouts, and backoff live in [`super::GenerativeClient`];
//! implementors only translate a prompt into one raw completion.

use anyhow::Result;
use async_trait::async_trait;

/// A single-shot text completion backend.
///
/// Implementations must be safe to call concurrently from many requests.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Short identifier recorded as the plan source (e.g. "gemini").
    fn name(&self) -> &str;

    /// Produce the raw completion text for `prompt`. Any error counts as a
    /// failed attempt.
    async fn generate(&self, prompt: &str) -> Result<String>;
}

// Compile-time assertion: TextGenerator must be object-safe.
const _: () = {
    fn _assert_object_safe(_: &dyn TextGenerator) {}
};
