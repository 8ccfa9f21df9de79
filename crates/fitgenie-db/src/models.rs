use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Author of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        };
        f.write_str(s)
    }
}

impl FromStr for ChatRole {
    type Err = ChatRoleParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            other => Err(ChatRoleParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`ChatRole`] string.
#[derive(Debug, Clone)]
pub struct ChatRoleParseError(pub String);

impl fmt::Display for ChatRoleParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid chat role: {:?}", self.0)
    }
}

impl std::error::Error for ChatRoleParseError {}

// ---------------------------------------------------------------------------
// Turn metadata
// ---------------------------------------------------------------------------

/// Structured metadata attached to a chat turn, stored as JSONB.
///
/// Each variant belongs to exactly one role, so the plan linkage of an
/// assistant turn is visible in the type: only `AssistantSuccess` carries a
/// plan id, and only `AssistantDegraded` carries defects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnMetadata {
    /// A user request, with the profile context the caller sent along.
    User {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        context: Option<serde_json::Value>,
    },
    /// The model produced a schema-valid plan, stored under `plan_id`.
    AssistantSuccess { plan_id: Uuid },
    /// The model answered, but the answer failed structural validation.
    AssistantDegraded { defects: Vec<String> },
    /// Every generation attempt failed.
    AssistantFailure { error: String },
    /// No metadata (system turns).
    Empty,
}

impl TurnMetadata {
    /// The role a turn carrying this metadata must have.
    pub fn role(&self) -> ChatRole {
        match self {
            Self::User { .. } => ChatRole::User,
            Self::AssistantSuccess { .. }
            | Self::AssistantDegraded { .. }
            | Self::AssistantFailure { .. } => ChatRole::Assistant,
            Self::Empty => ChatRole::System,
        }
    }

    /// The plan referenced by this turn, if any.
    pub fn plan_id(&self) -> Option<Uuid> {
        match self {
            Self::AssistantSuccess { plan_id } => Some(*plan_id),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Row structs
// ---------------------------------------------------------------------------

/// One persisted conversational turn.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChatMessage {
    pub id: i64,
    pub user_id: Uuid,
    pub role: ChatRole,
    pub content: String,
    #[sqlx(json)]
    pub metadata: TurnMetadata,
    pub created_at: DateTime<Utc>,
}

/// A generated plan that passed structural validation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source: String,
    pub prompt_snapshot: String,
    pub plan_json: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
