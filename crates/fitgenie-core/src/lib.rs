//! Plan-generation pipeline: prompt construction, model invocation with
//! retries, response extraction, structural validation, persistence of the
//! conversation, and per-identity admission control.

pub mod document;
pub mod extract;
pub mod generate;
pub mod orchestrator;
pub mod profile;
pub mod prompt;
pub mod rate_limit;
pub mod store;
pub mod token;
pub mod validate;
