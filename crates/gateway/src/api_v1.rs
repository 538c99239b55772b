//! HTTP API v1 — agent invocation, network routing, and thread management.
//!
//! Endpoints:
//!
//! - `GET  /v1/agents`                 — List built agents
//! - `POST /v1/agents/{id}/generate`   — Invoke an agent
//! - `POST /v1/agents/{id}/stream`     — Invoke an agent, get an SSE stream
//! - `GET  /v1/networks`               — List networks
//! - `POST /v1/networks/{name}/route`  — Route a task through a network
//! - `POST /v1/threads`                — Create a thread
//! - `POST /v1/threads/resolve`        — Get or create a resource's thread
//! - `GET  /v1/threads/latest`         — Most recent thread for a resource

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use conclave_agent::{AgentRegistry, InvokeOptions, InvokeRequest};
use conclave_core::error::{InvocationError, MemoryError};
use conclave_core::message::Message;
use conclave_core::response::AgentResponse;
use conclave_core::thread::{MemoryThread, ThreadId};
use conclave_memory::ThreadManager;

// ── State ─────────────────────────────────────────────────────────────────

/// Shared state for the v1 API.
pub struct ApiV1State {
    pub registry: Arc<AgentRegistry>,
    pub threads: Arc<ThreadManager>,
}

pub type SharedApiState = Arc<ApiV1State>;

// ── Router ────────────────────────────────────────────────────────────────

/// Build the v1 API router. Nest this under "/v1" in the main router.
pub fn v1_router(state: SharedApiState) -> Router {
    Router::new()
        .route("/agents", get(list_agents_handler))
        .route("/agents/{id}/generate", post(generate_handler))
        .route("/agents/{id}/stream", post(stream_handler))
        .route("/networks", get(list_networks_handler))
        .route("/networks/{name}/route", post(route_handler))
        .route("/threads", post(create_thread_handler))
        .route("/threads/resolve", post(resolve_thread_handler))
        .route("/threads/latest", get(latest_thread_handler))
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Deserialize)]
struct GenerateRequest {
    messages: Vec<Message>,
    #[serde(default)]
    thread_id: Option<String>,
    #[serde(default)]
    resource_id: Option<String>,
}

#[derive(Deserialize)]
struct RouteRequest {
    task: String,
    #[serde(default)]
    thread_id: Option<String>,
    #[serde(default)]
    resource_id: Option<String>,
}

#[derive(Deserialize)]
struct ThreadRequest {
    resource_id: String,
    #[serde(default)]
    metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Deserialize)]
struct LatestQuery {
    resource_id: String,
}

#[derive(Serialize)]
struct AgentListResponse {
    agents: Vec<AgentDto>,
}

#[derive(Serialize)]
struct AgentDto {
    id: String,
    name: String,
    description: String,
    provider: String,
    model: String,
    tools: Vec<String>,
}

#[derive(Serialize)]
struct NetworkListResponse {
    networks: Vec<NetworkDto>,
}

#[derive(Serialize)]
struct NetworkDto {
    name: String,
    agents: Vec<String>,
    fallback: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// A failed request. Only caller mistakes and storage faults end up here;
/// agent failures are already safe responses.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorResponse {
                error: self.message,
            }),
        )
            .into_response()
    }
}

impl From<InvocationError> for ApiError {
    fn from(err: InvocationError) -> Self {
        let status = match &err {
            InvocationError::UnknownAgent(_) | InvocationError::UnknownNetwork(_) => {
                StatusCode::NOT_FOUND
            }
            e if e.is_caller_error() => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl From<MemoryError> for ApiError {
    fn from(err: MemoryError) -> Self {
        match err {
            MemoryError::InvalidResource(_) => Self::new(StatusCode::BAD_REQUEST, err.to_string()),
            MemoryError::ThreadNotFound(_) => Self::new(StatusCode::NOT_FOUND, err.to_string()),
            MemoryError::Storage(reason) => {
                warn!(error = %reason, "Thread storage failure");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Conversation memory unavailable",
                )
            }
        }
    }
}

fn invoke_options(thread_id: Option<String>, resource_id: Option<String>) -> InvokeOptions {
    InvokeOptions {
        thread_id: thread_id.map(ThreadId::from),
        resource_id,
    }
}

// ── Agents ────────────────────────────────────────────────────────────────

async fn list_agents_handler(State(state): State<SharedApiState>) -> Json<AgentListResponse> {
    let agents = state
        .registry
        .list()
        .iter()
        .map(|agent| AgentDto {
            id: agent.id().to_string(),
            name: agent.name().to_string(),
            description: agent.purpose().to_string(),
            provider: agent.config().model.provider.clone(),
            model: agent.config().model.model.clone(),
            tools: agent.tool_ids().into_iter().map(String::from).collect(),
        })
        .collect();
    Json(AgentListResponse { agents })
}

/// `POST /v1/agents/{id}/generate`
async fn generate_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
    Json(payload): Json<GenerateRequest>,
) -> Result<Json<AgentResponse>, ApiError> {
    info!(agent_id = %id, messages = payload.messages.len(), "v1/generate request");
    let response = state
        .registry
        .invoke(
            &id,
            InvokeRequest::new(payload.messages),
            invoke_options(payload.thread_id, payload.resource_id),
        )
        .await?;
    Ok(Json(response))
}

// ── SSE Streaming ─────────────────────────────────────────────────────────

/// `POST /v1/agents/{id}/stream` — one SSE event per [`AgentStreamEvent`](conclave_agent::AgentStreamEvent).
async fn stream_handler(
    State(state): State<SharedApiState>,
    Path(id): Path<String>,
    Json(payload): Json<GenerateRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    info!(agent_id = %id, "v1/stream SSE request");

    let agent = state
        .registry
        .get(&id)
        .ok_or_else(|| InvocationError::UnknownAgent(id.clone()))?;
    let rx = agent.stream(
        payload.messages,
        invoke_options(payload.thread_id, payload.resource_id),
    )?;

    let stream = ReceiverStream::new(rx).map(|event| {
        let data = serde_json::to_string(&event).unwrap_or_default();
        Ok(SseEvent::default().event(event.event_type()).data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ── Networks ──────────────────────────────────────────────────────────────

async fn list_networks_handler(State(state): State<SharedApiState>) -> Json<NetworkListResponse> {
    let networks = state
        .registry
        .networks()
        .iter()
        .map(|network| NetworkDto {
            name: network.name().to_string(),
            agents: network.roster_ids().into_iter().map(String::from).collect(),
            fallback: network.fallback().as_str(),
        })
        .collect();
    Json(NetworkListResponse { networks })
}

/// `POST /v1/networks/{name}/route`
async fn route_handler(
    State(state): State<SharedApiState>,
    Path(name): Path<String>,
    Json(payload): Json<RouteRequest>,
) -> Result<Json<AgentResponse>, ApiError> {
    info!(network = %name, "v1/route request");
    let response = state
        .registry
        .route(
            &name,
            &payload.task,
            invoke_options(payload.thread_id, payload.resource_id),
        )
        .await?;
    Ok(Json(response))
}

// ── Threads ───────────────────────────────────────────────────────────────

/// `POST /v1/threads` — always a new thread.
async fn create_thread_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<ThreadRequest>,
) -> Result<(StatusCode, Json<MemoryThread>), ApiError> {
    let thread = state
        .threads
        .create_thread(&payload.resource_id, payload.metadata)
        .await?;
    Ok((StatusCode::CREATED, Json(thread)))
}

/// `POST /v1/threads/resolve` — the resource's most recent thread, created if needed.
async fn resolve_thread_handler(
    State(state): State<SharedApiState>,
    Json(payload): Json<ThreadRequest>,
) -> Result<Json<MemoryThread>, ApiError> {
    let thread = state
        .threads
        .get_or_create_thread(&payload.resource_id, payload.metadata)
        .await?;
    Ok(Json(thread))
}

async fn latest_thread_handler(
    State(state): State<SharedApiState>,
    Query(query): Query<LatestQuery>,
) -> Result<Json<MemoryThread>, ApiError> {
    state
        .threads
        .get_most_recent_thread(&query.resource_id)
        .await?
        .map(Json)
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                format!("No thread for resource '{}'", query.resource_id),
            )
        })
}
