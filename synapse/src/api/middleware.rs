//! API middleware

use axum::{
    body::Body,
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info, warn};

/// Request logging middleware
pub async fn logging(req: Request<Body>, next: Next) -> Result<Response<Body>, StatusCode> {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let started = Instant::now();

    info!("Request: {} {}", method, uri);

    let response = next.run(req).await;
    let elapsed_ms = started.elapsed().as_millis();

    if response.status().is_server_error() {
        warn!("Response: {} {} -> {} ({} ms)", method, uri, response.status(), elapsed_ms);
    } else {
        info!("Response: {} {} -> {} ({} ms)", method, uri, response.status(), elapsed_ms);
    }

    Ok(response)
}
