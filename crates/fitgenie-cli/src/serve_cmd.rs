use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::Result;
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, FromRequestParts, Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use fitgenie_core::orchestrator::{ChatOrchestrator, ChatRequest, PipelineError};
use fitgenie_core::rate_limit::{RateDecision, RateKey, RateLimitError, RateLimiter};
use fitgenie_core::token::{self, TokenConfig, TokenError};

const DEFAULT_HISTORY_LIMIT: i64 = 50;

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: ChatOrchestrator,
    pub limiter: Arc<RateLimiter>,
    pub tokens: TokenConfig,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

pub struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    rate: Option<RateDecision>,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            rate: None,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg)
    }

    pub fn unauthorized(err: &TokenError) -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            format!("Not authorized: {err}"),
        )
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", msg)
    }

    pub fn rate_limited(decision: RateDecision) -> Self {
        Self {
            rate: Some(decision),
            ..Self::new(
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMIT_EXCEEDED",
                "Too many requests. Please try again later.",
            )
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "SERVER_ERROR",
            format!("{err:#}"),
        )
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::InvalidRequest(_) => Self::validation("Message is required"),
            PipelineError::Generation(_) => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "LLM_FAILURE",
                "Failed to generate plan. Please try again.",
            ),
            PipelineError::Store(e) => Self::internal(e),
        }
    }
}

impl From<RateLimitError> for AppError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Exceeded {
                limit, reset_at, ..
            } => Self::rate_limited(RateDecision {
                admitted: false,
                limit,
                remaining: 0,
                reset_at,
            }),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, message = %self.message, "request failed");
        }
        let body = serde_json::json!({
            "ok": false,
            "error": { "code": self.code, "message": self.message },
        });
        let mut response = (self.status, Json(body)).into_response();
        if let Some(decision) = self.rate {
            apply_rate_headers(&mut response, &decision);
        }
        response
    }
}

// ---------------------------------------------------------------------------
// Envelope and headers
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct Envelope<T> {
    ok: bool,
    data: T,
}

fn ok<T: Serialize>(data: T) -> Response {
    Json(Envelope { ok: true, data }).into_response()
}

fn apply_rate_headers(response: &mut Response, decision: &RateDecision) {
    let headers = response.headers_mut();
    let values = [
        ("ratelimit-limit", u64::from(decision.limit)),
        ("ratelimit-remaining", u64::from(decision.remaining)),
        ("ratelimit-reset", decision.reset_after_secs(Utc::now())),
    ];
    for (name, value) in values {
        headers.insert(HeaderName::from_static(name), HeaderValue::from(value));
    }
}

// ---------------------------------------------------------------------------
// Caller identity
// ---------------------------------------------------------------------------

/// Who is calling: the bearer-token user if the token verifies, and the
/// peer address for rate limiting when it does not.
pub struct Caller {
    user: Result<Uuid, TokenError>,
    addr: IpAddr,
}

impl Caller {
    fn rate_key(&self) -> RateKey {
        RateKey::for_caller(self.user.as_ref().ok().copied(), self.addr)
    }

    fn require_user(&self) -> Result<Uuid, AppError> {
        match &self.user {
            Ok(id) => Ok(*id),
            Err(e) => Err(AppError::unauthorized(e)),
        }
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED), |ci| ci.0.ip());
        Ok(Self {
            user: token::authenticate_bearer(&state.tokens, header),
            addr,
        })
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(send_message))
        .route("/api/chat/history", get(chat_history))
        .route("/api/chat/plans", get(list_plans))
        .route("/api/chat/plans/{id}", get(get_plan))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(state: AppState, bind: &str, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("fitgenie serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;
    tracing::info!("fitgenie serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChatBody {
    message: Option<String>,
    context: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<String>,
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({ "ok": true }))
}

async fn not_found() -> AppError {
    AppError::not_found("Not Found")
}

async fn send_message(
    State(state): State<AppState>,
    caller: Caller,
    body: Result<Json<ChatBody>, JsonRejection>,
) -> Result<Response, AppError> {
    let decision = state.limiter.enforce(caller.rate_key())?;
    let user_id = caller.require_user()?;

    let Json(body) = body.map_err(|e| AppError::validation(e.body_text()))?;
    let message = body
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| AppError::validation("Message is required"))?;

    let reply = state
        .orchestrator
        .handle(ChatRequest {
            user_id,
            message,
            context: body.context,
        })
        .await
        .map_err(|e| AppError {
            rate: Some(decision),
            ..AppError::from(e)
        })?;

    let mut response = ok(reply);
    apply_rate_headers(&mut response, &decision);
    Ok(response)
}

async fn chat_history(
    State(state): State<AppState>,
    caller: Caller,
    Query(params): Query<HistoryParams>,
) -> Result<Response, AppError> {
    let user_id = caller.require_user()?;
    let limit = params
        .limit
        .and_then(|l| l.trim().parse::<i64>().ok())
        .filter(|l| *l > 0)
        .unwrap_or(DEFAULT_HISTORY_LIMIT);

    let messages = state
        .orchestrator
        .store()
        .history(user_id, limit)
        .await
        .map_err(AppError::internal)?;
    Ok(ok(messages))
}

async fn list_plans(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Response, AppError> {
    let user_id = caller.require_user()?;
    let plans = state
        .orchestrator
        .store()
        .list_plans(user_id)
        .await
        .map_err(AppError::internal)?;
    Ok(ok(plans))
}

async fn get_plan(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let user_id = caller.require_user()?;
    let Ok(plan_id) = Uuid::parse_str(&id) else {
        return Err(AppError::not_found("Plan not found"));
    };
    let plan = state
        .orchestrator
        .store()
        .get_plan(user_id, plan_id)
        .await
        .map_err(AppError::internal)?
        .ok_or_else(|| AppError::not_found("Plan not found"))?;
    Ok(ok(plan))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
