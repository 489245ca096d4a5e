//! Agent Types and Registration
//!
//! This module provides the agent data model and the Agent Store that owns
//! agent identity and lifecycle.
//!
//! # Architecture
//!
//! - Agent types form a closed set; each type owns a fixed capability set
//! - The type of an agent never changes after registration
//! - Status moves only through compare-and-set, driven by training
//!
//! # Agent Types
//!
//! - `insights` - dashboards, outcome prediction, utilization analysis
//! - `manage` - digital check-in, queues, triage
//! - `make` - OCR, entity extraction, document summaries
//! - `market` - reminders, market trends, demand forecasts
//! - `integration` - ABHA linking, compatibility checks, format conversion

pub mod types;
pub mod capabilities;
pub mod lifecycle;
pub mod store;

pub use types::*;
pub use capabilities::*;
pub use store::AgentStore;

/// Result type for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Agent-specific errors
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Invalid agent definition: {0}")]
    Validation(String),

    #[error("Agent not found: {0}")]
    NotFound(String),

    #[error("Field '{field}' cannot be changed after creation")]
    ImmutableField { field: &'static str },

    #[error("Agent {id} is {current}, cannot move to {next}")]
    StatusConflict {
        id: String,
        current: AgentStatus,
        next: AgentStatus,
    },
}

impl AgentError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "ValidationError",
            Self::NotFound(_) => "NotFound",
            Self::ImmutableField { .. } => "ImmutableFieldError",
            Self::StatusConflict { .. } => "Conflict",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AgentError::Validation("x".into()).code(), "ValidationError");
        assert_eq!(AgentError::NotFound("x".into()).code(), "NotFound");
        assert_eq!(AgentError::ImmutableField { field: "type" }.code(), "ImmutableFieldError");
    }
}
