//! Common test utilities for Synapse tests
//!
//! Builds service instances with short timeouts and fast retries, and sends
//! requests straight into the router without binding a socket.

#![allow(dead_code)]

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt; // For oneshot

use synapse::agents::{AgentId, AgentSpec, AgentStatus, AgentType};
use synapse::api;
use synapse::dispatch::DispatcherConfig;
use synapse::handlers::HandlerRegistry;
use synapse::services::AgentServices;
use synapse::training::{
    JobStatus, RetryPolicy, SimulatedPipeline, TrainingConfig, TrainingSettings,
};

/// Dispatcher settings used by most tests
pub fn fast_dispatcher() -> DispatcherConfig {
    DispatcherConfig {
        default_timeout: Duration::from_millis(500),
        ..Default::default()
    }
}

/// Training settings with millisecond backoff
pub fn fast_training() -> TrainingSettings {
    TrainingSettings {
        workers: 2,
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
            multiplier: 2.0,
        },
    }
}

/// Services with built-in handlers and a pipeline that takes `delay`
pub fn services_with_delay(delay: Duration) -> Arc<AgentServices> {
    Arc::new(
        AgentServices::builder()
            .pipeline(Arc::new(SimulatedPipeline::with_delay(delay)))
            .training(fast_training())
            .dispatcher(fast_dispatcher())
            .build(),
    )
}

pub fn test_services() -> Arc<AgentServices> {
    services_with_delay(Duration::ZERO)
}

/// Services using a custom registry
pub fn services_with_registry(registry: HandlerRegistry, dispatcher: DispatcherConfig) -> Arc<AgentServices> {
    Arc::new(
        AgentServices::builder()
            .registry(registry)
            .training(fast_training())
            .dispatcher(dispatcher)
            .build(),
    )
}

pub fn test_app(services: &Arc<AgentServices>) -> Router {
    api::build_app(Arc::clone(services))
}

/// Helper to send a request and get the JSON response
pub async fn send_request(
    app: &Router,
    method: &str,
    path: &str,
    body: Option<JsonValue>,
) -> (StatusCode, JsonValue) {
    let request_builder = Request::builder().method(method).uri(path);

    let request = if let Some(body_json) = body {
        request_builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body_json).unwrap()))
            .unwrap()
    } else {
        request_builder.body(Body::empty()).unwrap()
    };

    let response = app
        .clone()
        .oneshot(request)
        .await
        .expect("Failed to send request");

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read response body");
    let json = if body.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&body).expect("Response is not JSON")
    };

    (status, json)
}

/// Register an agent over HTTP and return its id
pub async fn create_agent(app: &Router, agent_type: &str) -> String {
    let (status, body) = send_request(
        app,
        "POST",
        "/agents",
        Some(json!({
            "name": format!("{} agent", agent_type),
            "description": "test agent",
            "type": agent_type,
            "capabilities": [],
            "configuration": {"model": "test-model"},
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "unexpected body: {}", body);
    body["data"]["id"].as_str().unwrap().to_string()
}

/// Register an agent directly in the store
pub fn register(services: &AgentServices, agent_type: AgentType) -> AgentId {
    services
        .store
        .create(AgentSpec::new(format!("{} agent", agent_type), agent_type))
        .unwrap()
        .id
}

/// Train an agent to completion and check it became ready
pub async fn train(services: &AgentServices, agent_id: &AgentId) {
    let job = services
        .training
        .submit(agent_id, TrainingConfig::default())
        .unwrap();
    let job = tokio::time::timeout(Duration::from_secs(5), services.training.wait_for(&job.id))
        .await
        .expect("training did not finish")
        .unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(services.store.get(agent_id).unwrap().status, AgentStatus::Ready);
}

/// Assert an error body carries `code`
pub fn assert_error_code(body: &JsonValue, code: &str) {
    assert_eq!(body["error"]["code"], code, "unexpected body: {}", body);
    assert!(body["error"]["message"].is_string());
}
