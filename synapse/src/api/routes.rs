//! API routes

use axum::{
    Json, Router,
    extract::{FromRequest, Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

use super::error::ApiError;
use crate::agents::{Agent, AgentId, AgentPatch, AgentSpec};
use crate::dispatch::ExecutionRecord;
use crate::performance::PerformanceSnapshot;
use crate::services::AgentServices;
use crate::training::{JobStatus, TrainingConfig, TrainingJob, TrainingJobId};

/// Application state shared across routes
#[derive(Clone)]
pub struct AppState {
    pub services: Arc<AgentServices>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(services: Arc<AgentServices>) -> Self {
        Self {
            services,
            started_at: Instant::now(),
        }
    }
}

/// `{data: ...}` success envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
}

fn data<T>(value: T) -> Json<Envelope<T>> {
    Json(Envelope { data: value })
}

/// JSON body extractor whose rejections use the API error shape
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub agents: usize,
}

/// Create all API routes
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))

        // Agent registry
        .route("/agents", get(list_agents).post(create_agent))
        .route("/agents/{id}", get(get_agent).patch(update_agent))

        // Training
        .route("/agents/{id}/training", get(list_training_jobs).post(start_training))
        .route("/agents/{id}/training/{job_id}", get(get_training_job))

        // Execution and performance
        .route("/agents/{id}/execute/{agent_type}", post(execute))
        .route("/agents/{id}/executions", get(list_executions))
        .route("/agents/{id}/performance", get(performance))

        .with_state(state)
}

/// Health check endpoint
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: crate::VERSION.to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        agents: state.services.store.len(),
    })
}

/// List all agents in registration order
async fn list_agents(State(state): State<AppState>) -> Json<Envelope<Vec<Agent>>> {
    data(state.services.store.list())
}

/// Register a new agent
async fn create_agent(
    State(state): State<AppState>,
    ApiJson(spec): ApiJson<AgentSpec>,
) -> Result<(StatusCode, Json<Envelope<Agent>>), ApiError> {
    let agent = state.services.store.create(spec)?;
    Ok((StatusCode::CREATED, data(agent)))
}

async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Agent>>, ApiError> {
    let agent = state.services.store.get(&AgentId::from_string(id))?;
    Ok(data(agent))
}

async fn update_agent(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<AgentPatch>,
) -> Result<Json<Envelope<Agent>>, ApiError> {
    let agent = state.services.store.update(&AgentId::from_string(id), patch)?;
    Ok(data(agent))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct StartTrainingRequest {
    training_config: TrainingConfig,
}

/// Accepted training job
#[derive(Debug, Serialize)]
struct TrainingAccepted {
    id: TrainingJobId,
    status: JobStatus,
}

async fn start_training(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<StartTrainingRequest>,
) -> Result<(StatusCode, Json<Envelope<TrainingAccepted>>), ApiError> {
    let job = state
        .services
        .training
        .submit(&AgentId::from_string(id), req.training_config)?;
    info!("Training job {} accepted for agent {}", job.id, job.agent_id);

    Ok((
        StatusCode::ACCEPTED,
        data(TrainingAccepted {
            id: job.id,
            status: job.status,
        }),
    ))
}

async fn list_training_jobs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Vec<TrainingJob>>>, ApiError> {
    let agent_id = existing_agent(&state, id)?;
    Ok(data(state.services.training.jobs_for_agent(&agent_id)))
}

async fn get_training_job(
    State(state): State<AppState>,
    Path((id, job_id)): Path<(String, String)>,
) -> Result<Json<Envelope<TrainingJob>>, ApiError> {
    let agent_id = existing_agent(&state, id)?;
    let job = state
        .services
        .training
        .job(&TrainingJobId::from_string(job_id))?;

    // A job is only visible under the agent it belongs to
    if job.agent_id != agent_id {
        return Err(ApiError::NotFound(format!("Training job not found: {}", job.id)));
    }
    Ok(data(job))
}

#[derive(Debug, Deserialize)]
struct ExecuteRequest {
    operation: String,
    #[serde(default)]
    data: JsonValue,
}

async fn execute(
    State(state): State<AppState>,
    Path((id, agent_type)): Path<(String, String)>,
    ApiJson(req): ApiJson<ExecuteRequest>,
) -> Result<Json<Envelope<JsonValue>>, ApiError> {
    let outcome = state
        .services
        .dispatcher
        .execute(&AgentId::from_string(id), &agent_type, &req.operation, req.data)
        .await?;

    let output = outcome.result?;
    Ok(data(output))
}

async fn list_executions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<Vec<ExecutionRecord>>>, ApiError> {
    let agent_id = existing_agent(&state, id)?;
    Ok(data(state.services.performance.records_for(&agent_id)))
}

async fn performance(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Envelope<PerformanceSnapshot>>, ApiError> {
    let agent_id = existing_agent(&state, id)?;
    Ok(data(state.services.performance.snapshot(&agent_id)))
}

fn existing_agent(state: &AppState, id: String) -> Result<AgentId, ApiError> {
    let agent_id = AgentId::from_string(id);
    if state.services.store.contains(&agent_id) {
        Ok(agent_id)
    } else {
        Err(ApiError::NotFound(format!("Agent not found: {}", agent_id)))
    }
}
