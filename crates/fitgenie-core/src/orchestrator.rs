//! One chat request, end to end.
//!
//! ```text
//! Received -> UserTurnPersisted -> Generated -> Extracted -> Validated -> Responded
//!                                      |                         |
//!                                      v                         v
//!                               GenerationFailed             Degraded
//! ```
//!
//! Every invocation stores exactly one user turn and one assistant turn, and
//! at most one plan. A plan and the assistant turn pointing at it are written
//! together.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use fitgenie_db::models::TurnMetadata;
use fitgenie_db::queries::plans::NewPlan;

use crate::extract;
use crate::generate::{GenerationError, GenerativeClient};
use crate::profile::UserContext;
use crate::prompt;
use crate::store::ChatStore;
use crate::validate::{self, ValidationVerdict};

pub const APOLOGY_TEXT: &str =
    "I apologize, but I encountered an error generating your plan. Please try again.";
pub const SUCCESS_TEXT: &str =
    "Here's your personalized fitness plan! Click 'View Plan' to see the details.";
pub const DEGRADED_TEXT: &str =
    "I've created some suggestions for you, but some details might need clarification.";

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// An inbound chat message.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub user_id: Uuid,
    pub message: String,
    /// Profile snapshot sent by the caller. Stored with the user turn and
    /// rendered into the prompt.
    pub context: Option<Value>,
}

/// What the caller gets back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub assistant_text: String,
    pub plan_id: Option<Uuid>,
    #[serde(rename = "planJSON")]
    pub plan_json: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub defects: Option<Vec<String>>,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error("storage failure: {0:#}")]
    Store(anyhow::Error),
}

/// Lifecycle of one invocation, logged at debug level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    UserTurnPersisted,
    Generated,
    Extracted,
    Validated,
    Responded,
    GenerationFailed,
    Degraded,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Received => "received",
            Self::UserTurnPersisted => "user_turn_persisted",
            Self::Generated => "generated",
            Self::Extracted => "extracted",
            Self::Validated => "validated",
            Self::Responded => "responded",
            Self::GenerationFailed => "generation_failed",
            Self::Degraded => "degraded",
        };
        f.write_str(s)
    }
}

fn enter(stage: PipelineStage, user_id: Uuid) {
    tracing::debug!(%user_id, stage = %stage, "pipeline stage");
}

/// Drives prompt building, generation, extraction, validation, and
/// persistence for chat requests. Cheap to clone and share across tasks.
#[derive(Clone)]
pub struct ChatOrchestrator {
    store: Arc<dyn ChatStore>,
    client: GenerativeClient,
    max_attempts: u32,
}

impl ChatOrchestrator {
    pub fn new(store: Arc<dyn ChatStore>, client: GenerativeClient) -> Self {
        Self {
            store,
            client,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn store(&self) -> &Arc<dyn ChatStore> {
        &self.store
    }

    pub async fn handle(&self, request: ChatRequest) -> Result<ChatReply, PipelineError> {
        let user_id = request.user_id;
        enter(PipelineStage::Received, user_id);

        let message = request.message.trim();
        if message.is_empty() {
            return Err(PipelineError::InvalidRequest("message is required".into()));
        }

        self.store
            .append_turn(
                user_id,
                message,
                &TurnMetadata::User {
                    context: request.context.clone(),
                },
            )
            .await
            .map_err(PipelineError::Store)?;
        enter(PipelineStage::UserTurnPersisted, user_id);

        let profile = request.context.as_ref().map(UserContext::from_json);
        let prompt_text = prompt::build_prompt(profile.as_ref(), message);

        let response = match self.client.generate(&prompt_text, self.max_attempts).await {
            Ok(response) => response,
            Err(err) => {
                enter(PipelineStage::GenerationFailed, user_id);
                tracing::warn!(%user_id, attempts = err.attempts, error = %err.last_error, "plan generation failed");
                self.store
                    .append_turn(
                        user_id,
                        APOLOGY_TEXT,
                        &TurnMetadata::AssistantFailure {
                            error: err.last_error.clone(),
                        },
                    )
                    .await
                    .map_err(PipelineError::Store)?;
                return Err(PipelineError::Generation(err));
            }
        };
        enter(PipelineStage::Generated, user_id);

        let (candidate, verdict) = match extract::extract(&response.text) {
            Ok(candidate) => {
                enter(PipelineStage::Extracted, user_id);
                let verdict = validate::validate(Some(&candidate));
                (Some(candidate), verdict)
            }
            Err(err) => {
                tracing::debug!(%user_id, error = %err, "model response was not JSON");
                (None, ValidationVerdict::single_defect(err.to_string()))
            }
        };
        enter(PipelineStage::Validated, user_id);

        let reply = match candidate {
            Some(plan_json) if verdict.valid => {
                let new = NewPlan {
                    id: Uuid::new_v4(),
                    user_id,
                    source: self.client.source(),
                    prompt_snapshot: message,
                    plan_json: &plan_json,
                };
                let (plan, _) = self
                    .store
                    .create_plan_with_turn(&new, SUCCESS_TEXT)
                    .await
                    .map_err(PipelineError::Store)?;
                tracing::info!(%user_id, plan_id = %plan.id, attempts = response.attempts, "plan created");
                ChatReply {
                    assistant_text: SUCCESS_TEXT.to_owned(),
                    plan_id: Some(plan.id),
                    plan_json: Some(plan.plan_json),
                    defects: None,
                }
            }
            _ => {
                enter(PipelineStage::Degraded, user_id);
                tracing::info!(%user_id, defects = verdict.defects.len(), "plan failed validation");
                self.store
                    .append_turn(
                        user_id,
                        DEGRADED_TEXT,
                        &TurnMetadata::AssistantDegraded {
                            defects: verdict.defects.clone(),
                        },
                    )
                    .await
                    .map_err(PipelineError::Store)?;
                ChatReply {
                    assistant_text: DEGRADED_TEXT.to_owned(),
                    plan_id: None,
                    plan_json: None,
                    defects: Some(verdict.defects),
                }
            }
        };

        enter(PipelineStage::Responded, user_id);
        Ok(reply)
    }
}
