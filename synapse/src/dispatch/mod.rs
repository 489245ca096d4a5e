//! Execution Dispatch
//!
//! The dispatcher is type-agnostic: it validates an invocation against the
//! agent, resolves the handler through the registry and runs it under a
//! time bound. Every invocation that reaches a handler produces exactly one
//! sealed [`ExecutionRecord`]; earlier rejections produce none.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::agents::{AgentStatus, AgentType};
use crate::handlers::{HandlerError, Operation};

pub mod dispatcher;

pub use crate::performance::{ExecutionRecord, ExecutionStatus, FailureReason};
pub use dispatcher::ExecutionDispatcher;

/// Result type for dispatch
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Rejections raised before a handler runs
#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error("Agent not found: {0}")]
    NotFound(String),

    #[error("Agent is of type '{actual}', not '{declared}'")]
    TypeMismatch { declared: String, actual: AgentType },

    #[error("Operation '{operation}' is not available for {agent_type} agents")]
    UnknownOperation {
        agent_type: AgentType,
        operation: String,
    },

    #[error("Agent {id} is {status} and does not accept executions yet")]
    AgentNotReady { id: String, status: AgentStatus },
}

impl DispatchError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFound",
            Self::TypeMismatch { .. } => "TypeMismatch",
            Self::UnknownOperation { .. } => "UnknownOperation",
            Self::AgentNotReady { .. } => "AgentNotReady",
        }
    }
}

/// Whether executions wait for training to finish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessPolicy {
    /// Only `ready` agents accept executions
    #[default]
    RejectUntilReady,
    /// Any agent accepts executions, including one being trained
    AllowWhileTraining,
}

impl ReadinessPolicy {
    pub fn permits(self, status: AgentStatus) -> bool {
        match self {
            Self::RejectUntilReady => status.accepts_executions(),
            Self::AllowWhileTraining => true,
        }
    }
}

impl fmt::Display for ReadinessPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RejectUntilReady => f.write_str("reject_until_ready"),
            Self::AllowWhileTraining => f.write_str("allow_while_training"),
        }
    }
}

/// Dispatcher settings
#[derive(Debug, Clone, PartialEq)]
pub struct DispatcherConfig {
    pub default_timeout: Duration,
    /// Keyed by `type.operation` or by bare operation name
    pub operation_timeouts: HashMap<String, Duration>,
    pub readiness: ReadinessPolicy,
    /// Run at most one execution per agent at a time. Time spent waiting
    /// for the agent counts against the operation timeout.
    pub serialize_per_agent: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(30),
            operation_timeouts: HashMap::new(),
            readiness: ReadinessPolicy::default(),
            serialize_per_agent: false,
        }
    }
}

impl DispatcherConfig {
    /// Time bound for one operation
    pub fn timeout_for(&self, operation: Operation) -> Duration {
        self.operation_timeouts
            .get(&operation.to_string())
            .or_else(|| self.operation_timeouts.get(operation.name()))
            .copied()
            .unwrap_or(self.default_timeout)
    }
}

/// Why a handler-stage invocation failed
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionFailure {
    #[error(transparent)]
    Handler(HandlerError),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Handler panicked: {0}")]
    Panicked(String),
}

impl ExecutionFailure {
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::Handler(_) => FailureReason::HandlerError,
            Self::Timeout(_) => FailureReason::Timeout,
            Self::Panicked(_) => FailureReason::Panicked,
        }
    }
}

/// Result of an invocation that reached the handler stage
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    /// The sealed record of this invocation
    pub record: ExecutionRecord,
    pub result: std::result::Result<JsonValue, ExecutionFailure>,
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}
