//! Operation Handlers
//!
//! Handlers are the only place where an agent type fans out to concrete
//! behavior. Each agent type exposes a closed set of operations
//! ([`operation`]); the [`HandlerRegistry`] maps every operation to an
//! implementation of [`Handler`].
//!
//! The built-in handlers are deterministic, rule-based stand-ins. Real
//! integrations (OCR engines, SMS gateways, ABHA lookups) plug in by
//! registering a different handler for the same operation.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

pub mod operation;
pub mod registry;
pub mod insights;
pub mod manage;
pub mod make;
pub mod market;
pub mod integration;

pub use operation::*;
pub use registry::HandlerRegistry;

/// Result of a handler invocation
pub type HandlerResult = std::result::Result<JsonValue, HandlerError>;

/// Failure reported by a handler
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerError {
    /// The request payload does not fit the operation
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The operation ran and failed
    #[error("Operation failed: {0}")]
    Failed(String),
}

impl HandlerError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }
}

/// Implementation of one (agent type, operation) pair
#[async_trait]
pub trait Handler: Send + Sync {
    /// Run the operation against the request payload
    async fn handle(&self, input: JsonValue) -> HandlerResult;
}

/// Handler backed by a synchronous function
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F> Handler for FnHandler<F>
where
    F: Fn(JsonValue) -> HandlerResult + Send + Sync,
{
    async fn handle(&self, input: JsonValue) -> HandlerResult {
        (self.f)(input)
    }
}

/// Handler backed by an async function
pub struct AsyncFnHandler<F, Fut> {
    f: F,
    _fut: PhantomData<fn() -> Fut>,
}

#[async_trait]
impl<F, Fut> Handler for AsyncFnHandler<F, Fut>
where
    F: Fn(JsonValue) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, input: JsonValue) -> HandlerResult {
        (self.f)(input).await
    }
}

/// Wrap a synchronous function as a shared handler
pub fn from_fn<F>(f: F) -> Arc<dyn Handler>
where
    F: Fn(JsonValue) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(FnHandler { f })
}

/// Wrap an async function as a shared handler
pub fn from_async_fn<F, Fut>(f: F) -> Arc<dyn Handler>
where
    F: Fn(JsonValue) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(AsyncFnHandler { f, _fut: PhantomData })
}

/// Deserialize a request payload into an operation's input type
pub(crate) fn parse_input<T: DeserializeOwned>(input: JsonValue) -> Result<T, HandlerError> {
    let input = if input.is_null() {
        JsonValue::Object(Default::default())
    } else {
        input
    };
    serde_json::from_value(input).map_err(|e| HandlerError::InvalidInput(e.to_string()))
}

/// Round to two decimals for presentation
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
