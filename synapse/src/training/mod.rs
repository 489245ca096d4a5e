//! Training Job Management
//!
//! Training runs asynchronously: `submit` records a job as `queued` and hands
//! it to a bounded worker pool over a FIFO channel. Workers run the
//! pluggable [`TrainingPipeline`], retrying transient failures with
//! exponential backoff, and drive the agent's status through the store's
//! compare-and-set.
//!
//! ```text
//! queued ──▶ running ──▶ completed
//!   ▲           │
//!   └─transient─┤
//!               └──────▶ failed
//! ```

use std::fmt;
use std::time::Duration;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::agents::{Agent, AgentId};

pub mod manager;
pub mod pipeline;

pub use manager::TrainingJobManager;
pub use pipeline::SimulatedPipeline;

/// Result type for training operations
pub type Result<T> = std::result::Result<T, TrainingError>;

/// Metrics reported by a finished pipeline run
pub type TrainingMetrics = Map<String, JsonValue>;

/// Training-specific errors
#[derive(Debug, thiserror::Error)]
pub enum TrainingError {
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Training job not found: {0}")]
    JobNotFound(String),

    #[error("Agent {agent_id} already has active training job {job_id}")]
    Conflict { agent_id: String, job_id: String },

    #[error("Training manager is shut down")]
    ShutDown,
}

impl TrainingError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::AgentNotFound(_) | Self::JobNotFound(_) => "NotFound",
            Self::Conflict { .. } => "Conflict",
            Self::ShutDown => "InternalError",
        }
    }
}

/// Failure of a single pipeline run
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    /// Worth retrying (resource contention, flaky data source)
    #[error("Transient training failure: {0}")]
    Transient(String),

    /// Retrying cannot help (invalid configuration)
    #[error("Training failed: {0}")]
    Permanent(String),
}

/// Unique identifier for a training job
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrainingJobId(String);

impl TrainingJobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TrainingJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TrainingJobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Training job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Queued or running jobs hold the agent's training slot
    pub fn is_active(self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Training configuration, snapshotted when the job is accepted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TrainingConfig {
    pub epochs: Option<u32>,
    #[serde(alias = "learning_rate")]
    pub learning_rate: Option<f64>,
    #[serde(alias = "batch_size")]
    pub batch_size: Option<u32>,
    pub dataset: Option<String>,
    pub parameters: Map<String, JsonValue>,
}

/// A training job and its outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingJob {
    pub id: TrainingJobId,
    pub agent_id: AgentId,
    pub config: TrainingConfig,
    pub status: JobStatus,
    /// Pipeline runs so far
    pub attempts: u32,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metrics: Option<TrainingMetrics>,
    pub error: Option<String>,
}

impl TrainingJob {
    fn queued(agent_id: AgentId, config: TrainingConfig) -> Self {
        Self {
            id: TrainingJobId::new(),
            agent_id,
            config,
            status: JobStatus::Queued,
            attempts: 0,
            submitted_at: Utc::now(),
            started_at: None,
            completed_at: None,
            metrics: None,
            error: None,
        }
    }
}

/// Retry schedule for transient pipeline failures
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total pipeline runs, including the first
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the run following failed run number `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        if !secs.is_finite() || secs >= self.max_backoff.as_secs_f64() {
            self.max_backoff
        } else {
            Duration::from_secs_f64(secs)
        }
    }
}

/// Training manager settings
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSettings {
    pub workers: usize,
    pub retry: RetryPolicy,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            workers: 2,
            retry: RetryPolicy::default(),
        }
    }
}

/// A training implementation.
///
/// Runs once per attempt against a snapshot of the agent taken when the
/// attempt starts.
#[async_trait]
pub trait TrainingPipeline: Send + Sync {
    async fn train(
        &self,
        agent: &Agent,
        config: &TrainingConfig,
    ) -> std::result::Result<TrainingMetrics, PipelineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            multiplier: 2.0,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
        assert_eq!(policy.backoff(4), Duration::from_millis(500));
        assert_eq!(policy.backoff(60), Duration::from_millis(500));
    }

    #[test]
    fn test_config_accepts_both_casings() {
        let camel: TrainingConfig =
            serde_json::from_value(serde_json::json!({"learningRate": 0.01, "batchSize": 8})).unwrap();
        let snake: TrainingConfig =
            serde_json::from_value(serde_json::json!({"learning_rate": 0.01, "batch_size": 8})).unwrap();
        assert_eq!(camel, snake);
        assert_eq!(camel.batch_size, Some(8));
    }

    #[test]
    fn test_job_status_activity() {
        assert!(JobStatus::Queued.is_active());
        assert!(JobStatus::Running.is_active());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert_eq!(TrainingError::ShutDown.code(), "InternalError");
    }
}
