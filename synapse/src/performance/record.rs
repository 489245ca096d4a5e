//! Execution records

use std::fmt;
use std::time::Duration;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::agents::AgentId;

/// Outcome class of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failure,
}

/// Why a failed execution failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The handler returned an error
    HandlerError,
    /// The handler exceeded its time bound and was aborted
    Timeout,
    /// The handler panicked
    Panicked,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::HandlerError => "handler_error",
            Self::Timeout => "timeout",
            Self::Panicked => "panicked",
        };
        f.write_str(s)
    }
}

/// One dispatched invocation, sealed when created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub id: String,
    pub agent_id: AgentId,
    pub operation: String,
    pub input: JsonValue,
    pub output: Option<JsonValue>,
    pub error: Option<String>,
    pub status: ExecutionStatus,
    pub failure_reason: Option<FailureReason>,
    pub duration_ms: u64,
    /// When the invocation started
    pub timestamp: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn success(
        agent_id: AgentId,
        operation: impl Into<String>,
        input: JsonValue,
        output: JsonValue,
        started: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id,
            operation: operation.into(),
            input,
            output: Some(output),
            error: None,
            status: ExecutionStatus::Success,
            failure_reason: None,
            duration_ms: duration.as_millis() as u64,
            timestamp: started,
        }
    }

    pub fn failure(
        agent_id: AgentId,
        operation: impl Into<String>,
        input: JsonValue,
        reason: FailureReason,
        error: impl Into<String>,
        started: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            agent_id,
            operation: operation.into(),
            input,
            output: None,
            error: Some(error.into()),
            status: ExecutionStatus::Failure,
            failure_reason: Some(reason),
            duration_ms: duration.as_millis() as u64,
            timestamp: started,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}
