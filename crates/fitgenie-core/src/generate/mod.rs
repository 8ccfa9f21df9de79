//! Model invocation for plan generation.
//!
//! ```text
//! ChatOrchestrator
//!     |
//!     v
//! GenerativeClient --generate(prompt, max_attempts)--> RawModelResponse
//!     |      (per-attempt timeout, jittered backoff)
//!     v
//! &dyn TextGenerator --generate(prompt)--> String
//!     |
//!     +-- GeminiGenerator (HTTP)
//!     +-- test stubs
//! ```

pub mod client;
pub mod gemini;
pub mod trait_def;

pub use client::{GenerationError, GenerativeClient, RawModelResponse, RetryPolicy};
pub use gemini::{GeminiConfig, GeminiGenerator};
pub use trait_def::TextGenerator;
