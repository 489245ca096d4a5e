//! REST API Server implementation

use anyhow::Result;
use axum::{Router, middleware};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, info, warn};

use super::error::ApiError;
use super::{middleware as api_middleware, routes};
use crate::config::SynapseConfig;
use crate::services::AgentServices;

/// Router with every route and the HTTP middleware stack
pub fn build_app(services: Arc<AgentServices>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .max_age(Duration::from_secs(3600));

    routes::create_routes(routes::AppState::new(services))
        .fallback(|| async { ApiError::NotFound("No such route".to_string()) })
        .layer(middleware::from_fn(api_middleware::logging))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
}

/// Run the REST API server until ctrl-c, then drain training
pub async fn start_server(config: &SynapseConfig, services: Arc<AgentServices>) -> Result<()> {
    let addr = config.bind_address();
    let app = build_app(Arc::clone(&services));

    info!("Synapse API Server starting...");
    info!("  Listening: http://{}", addr);
    info!("  Training workers: {}", services.training.worker_count());

    let listener = tokio::net::TcpListener::bind(addr.as_str()).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Server stopped, draining training queue");
    services.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
