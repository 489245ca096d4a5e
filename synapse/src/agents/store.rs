//! Agent Store
//!
//! In-memory arena of agent definitions keyed by id. Listing preserves
//! registration order. The store is the only owner of agent identity; other
//! services hold `AgentId` back-references.

use std::collections::HashMap;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::{
    validate_capabilities, Agent, AgentError, AgentId, AgentPatch, AgentSpec, AgentStatus,
    AgentType, Result,
};

/// Maximum accepted length of an agent name
const MAX_NAME_LEN: usize = 128;

#[derive(Default)]
struct StoreInner {
    agents: HashMap<AgentId, Agent>,
    order: Vec<AgentId>,
}

/// Durable record of agent definitions
#[derive(Default)]
pub struct AgentStore {
    inner: RwLock<StoreInner>,
}

impl AgentStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a new agent with status `created`
    pub fn create(&self, spec: AgentSpec) -> Result<Agent> {
        let name = validate_name(&spec.name)?;
        let agent_type: AgentType = spec.agent_type.parse()?;
        let capabilities = validate_capabilities(agent_type, &spec.capabilities)?;

        let now = Utc::now();
        let agent = Agent {
            id: AgentId::new(),
            name,
            description: spec.description,
            agent_type,
            capabilities,
            configuration: spec.configuration,
            status: AgentStatus::Created,
            created_at: now,
            updated_at: now,
        };

        let mut inner = self.inner.write();
        inner.order.push(agent.id.clone());
        inner.agents.insert(agent.id.clone(), agent.clone());
        drop(inner);

        info!(agent_id = %agent.id, agent_type = %agent.agent_type, "Registered agent '{}'", agent.name);
        Ok(agent)
    }

    /// Fetch an agent by id
    pub fn get(&self, id: &AgentId) -> Result<Agent> {
        self.inner
            .read()
            .agents
            .get(id)
            .cloned()
            .ok_or_else(|| AgentError::NotFound(id.to_string()))
    }

    /// Whether an agent with this id exists
    pub fn contains(&self, id: &AgentId) -> bool {
        self.inner.read().agents.contains_key(id)
    }

    /// All agents in registration order
    pub fn list(&self) -> Vec<Agent> {
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter_map(|id| inner.agents.get(id).cloned())
            .collect()
    }

    /// Number of registered agents
    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply a partial update.
    ///
    /// The type is immutable: a patch naming a different type is rejected
    /// and nothing is written. Capabilities are re-validated against the
    /// stored type.
    pub fn update(&self, id: &AgentId, patch: AgentPatch) -> Result<Agent> {
        let mut inner = self.inner.write();
        let agent = inner
            .agents
            .get_mut(id)
            .ok_or_else(|| AgentError::NotFound(id.to_string()))?;

        if let Some(requested) = patch.agent_type.as_deref() {
            let requested: AgentType = requested.parse()?;
            if requested != agent.agent_type {
                return Err(AgentError::ImmutableField { field: "type" });
            }
        }

        // Validate everything before touching the record
        let name = patch.name.as_deref().map(validate_name).transpose()?;
        let capabilities = patch
            .capabilities
            .as_deref()
            .map(|tags| validate_capabilities(agent.agent_type, tags))
            .transpose()?;

        if let Some(name) = name {
            agent.name = name;
        }
        if let Some(description) = patch.description {
            agent.description = description;
        }
        if let Some(capabilities) = capabilities {
            agent.capabilities = capabilities;
        }
        if let Some(configuration) = patch.configuration {
            agent.configuration = configuration;
        }
        agent.updated_at = Utc::now();

        debug!(agent_id = %id, "Updated agent");
        Ok(agent.clone())
    }

    /// Compare-and-set the agent status.
    ///
    /// Succeeds only if the current status is one of `expected` and the
    /// lifecycle allows the move; returns the status that was replaced.
    pub(crate) fn transition_status(
        &self,
        id: &AgentId,
        expected: &[AgentStatus],
        next: AgentStatus,
    ) -> Result<AgentStatus> {
        let mut inner = self.inner.write();
        let agent = inner
            .agents
            .get_mut(id)
            .ok_or_else(|| AgentError::NotFound(id.to_string()))?;

        let current = agent.status;
        if !expected.contains(&current) || !current.can_transition_to(next) {
            return Err(AgentError::StatusConflict {
                id: id.to_string(),
                current,
                next,
            });
        }

        agent.status = next;
        agent.updated_at = Utc::now();
        debug!(agent_id = %id, "Agent status {} -> {}", current, next);
        Ok(current)
    }
}

fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AgentError::Validation("agent name must not be empty".to_string()));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(AgentError::Validation(format!(
            "agent name exceeds {} characters",
            MAX_NAME_LEN
        )));
    }
    Ok(trimmed.to_string())
}
