//! Core Agent Types and Data Structures

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{AgentError, Capability};

/// Unique identifier for an agent
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(String);

impl AgentId {
    /// Create a new unique agent ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from string (path parameters, tests)
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classification of agent types.
///
/// The set is closed: every type owns a fixed capability set and a fixed
/// operation set, and an agent's type never changes after registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentType {
    /// Analytics dashboards and clinical outcome insights
    Insights,

    /// Front-desk operations: check-in, queues, triage
    Manage,

    /// Document production: OCR, entity extraction, summaries
    Make,

    /// Patient outreach: reminders and market analysis
    Market,

    /// External health-system integration (ABHA, record exchange)
    Integration,
}

impl AgentType {
    /// Every agent type, in declaration order
    pub const ALL: [AgentType; 5] = [
        AgentType::Insights,
        AgentType::Manage,
        AgentType::Make,
        AgentType::Market,
        AgentType::Integration,
    ];

    /// Wire name of the type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insights => "insights",
            Self::Manage => "manage",
            Self::Make => "make",
            Self::Market => "market",
            Self::Integration => "integration",
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "insights" => Ok(Self::Insights),
            "manage" => Ok(Self::Manage),
            "make" => Ok(Self::Make),
            "market" => Ok(Self::Market),
            "integration" => Ok(Self::Integration),
            other => Err(AgentError::Validation(format!(
                "unknown agent type '{}', expected one of: insights, manage, make, market, integration",
                other
            ))),
        }
    }
}

/// Current status of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    /// Registered, never trained
    Created,

    /// A training job is running against the agent
    Training,

    /// Trained and accepting executions
    Ready,
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Training => "training",
            Self::Ready => "ready",
        };
        f.write_str(s)
    }
}

/// Structured agent configuration, stored as submitted
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AgentConfiguration {
    /// Model identifier
    pub model: String,

    /// Free-form model parameters
    pub parameters: Map<String, JsonValue>,

    /// Training-data source identifiers
    pub training_data: Vec<String>,

    /// API endpoint identifiers
    pub api_endpoints: Vec<String>,
}

/// A registered agent
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub agent_type: AgentType,
    pub capabilities: BTreeSet<Capability>,
    pub configuration: AgentConfiguration,
    pub status: AgentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registration request.
///
/// Type and capabilities arrive as raw tags and are validated by the store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub agent_type: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub configuration: AgentConfiguration,
}

impl AgentSpec {
    /// Convenience constructor used by tests and the CLI
    pub fn new(name: impl Into<String>, agent_type: AgentType) -> Self {
        Self {
            name: name.into(),
            agent_type: agent_type.as_str().to_string(),
            ..Default::default()
        }
    }

    /// Add a capability tag
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capabilities.push(capability.into());
        self
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Partial update of an agent's mutable fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Present only to be rejected when it differs from the stored type
    #[serde(rename = "type")]
    pub agent_type: Option<String>,
    pub capabilities: Option<Vec<String>>,
    pub configuration: Option<AgentConfiguration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id() {
        let id1 = AgentId::new();
        let id2 = AgentId::new();
        assert_ne!(id1, id2);
        assert_eq!(AgentId::from_string("abc").to_string(), "abc");
    }

    #[test]
    fn test_agent_type_parsing() {
        assert_eq!("insights".parse::<AgentType>().unwrap(), AgentType::Insights);
        assert_eq!(" Manage ".parse::<AgentType>().unwrap(), AgentType::Manage);
        assert!(matches!(
            "billing".parse::<AgentType>(),
            Err(AgentError::Validation(_))
        ));
    }

    #[test]
    fn test_agent_type_wire_format() {
        for agent_type in AgentType::ALL {
            let json = serde_json::to_string(&agent_type).unwrap();
            assert_eq!(json, format!("\"{}\"", agent_type.as_str()));
        }
    }

    #[test]
    fn test_configuration_defaults() {
        let config: AgentConfiguration =
            serde_json::from_value(serde_json::json!({"model": "gpt-4"})).unwrap();
        assert_eq!(config.model, "gpt-4");
        assert!(config.training_data.is_empty());
        assert!(config.parameters.is_empty());
    }
}
