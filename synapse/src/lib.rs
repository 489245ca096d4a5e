//! Synapse - Agent Orchestration Service
//!
//! Synapse registers typed agents, trains them asynchronously and dispatches
//! typed operations to them while keeping per-agent performance statistics.
//!
//! # Architecture
//!
//! - `agents` - agent data model and the Agent Store
//! - `handlers` - per-type operation sets and their handlers
//! - `training` - asynchronous training jobs on a bounded worker pool
//! - `dispatch` - validation and time-bounded execution of operations
//! - `performance` - execution records and per-agent statistics
//! - `services` - construction of the services above
//! - `api` - REST surface over the services
//! - `config` - layered configuration

pub mod agents;
pub mod handlers;
pub mod training;
pub mod dispatch;
pub mod performance;

pub mod config;
pub mod services;

// REST API
pub mod api;

pub use agents::{Agent, AgentId, AgentStatus, AgentStore, AgentType};
pub use config::SynapseConfig;
pub use dispatch::ExecutionDispatcher;
pub use handlers::{Handler, HandlerRegistry, Operation};
pub use performance::PerformanceAggregator;
pub use services::AgentServices;
pub use training::TrainingJobManager;

/// Synapse version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
