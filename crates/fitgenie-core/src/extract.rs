//! Recover the JSON payload from raw model text.
//!
//! Models wrap JSON in Markdown fences, prefix it with prose, or return it
//! bare. If a fenced block is present, only its body is parsed; otherwise
//! the whole text is.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// First fenced block: opening backticks, an optional language hint, then
/// the body up to the next closing backticks.
static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+.\-]*[ \t]*\r?\n?(.*?)```").expect("fence pattern is valid")
});

/// Failure to recover a JSON value from the model's text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("response contained no JSON payload")]
    Empty { raw: String },

    #[error("response is not valid JSON: {source}")]
    Malformed {
        raw: String,
        #[source]
        source: serde_json::Error,
    },
}

impl ExtractionError {
    /// The model text that failed to parse.
    pub fn raw_text(&self) -> &str {
        match self {
            Self::Empty { raw } | Self::Malformed { raw, .. } => raw,
        }
    }
}

/// The text that will be parsed: the body of the first fenced block if any,
/// else the whole input, trimmed.
pub fn json_payload(raw: &str) -> &str {
    FENCED_BLOCK
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map_or(raw, |body| body.as_str())
        .trim()
}

/// Parse the model's JSON payload into an unvalidated candidate.
pub fn extract(raw: &str) -> Result<Value, ExtractionError> {
    let payload = json_payload(raw);
    if payload.is_empty() {
        return Err(ExtractionError::Empty {
            raw: raw.to_owned(),
        });
    }

    serde_json::from_str(payload).map_err(|source| ExtractionError::Malformed {
        raw: raw.to_owned(),
        source,
    })
}
