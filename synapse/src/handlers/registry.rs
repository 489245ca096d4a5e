//! Handler Registry
//!
//! Maps every operation to the handler implementing it. Keys are typed
//! [`Operation`] values, so a handler registered for a `manage` operation
//! can never be reached through an `insights` agent.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{insights, integration, make, manage, market, Handler, Operation};
use crate::agents::AgentType;

/// Registry that maps operations to their handlers
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Operation, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    /// Registry without any handlers
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in handler for every operation
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        insights::register(&mut registry);
        manage::register(&mut registry);
        make::register(&mut registry);
        market::register(&mut registry);
        integration::register(&mut registry);
        registry
    }

    /// Register (or replace) the handler of an operation
    pub fn register(&mut self, operation: impl Into<Operation>, handler: Arc<dyn Handler>) {
        let operation = operation.into();
        if self.handlers.insert(operation, handler).is_some() {
            debug!("Replaced handler for {}", operation);
        }
    }

    /// Remove the handler of an operation
    pub fn unregister(&mut self, operation: impl Into<Operation>) -> bool {
        self.handlers.remove(&operation.into()).is_some()
    }

    /// Resolve an operation name for an agent type
    pub fn resolve(&self, agent_type: AgentType, name: &str) -> Option<(Operation, Arc<dyn Handler>)> {
        let operation = Operation::resolve(agent_type, name)?;
        self.handlers
            .get(&operation)
            .map(|handler| (operation, Arc::clone(handler)))
    }

    /// Whether an operation name resolves for an agent type
    pub fn is_registered(&self, agent_type: AgentType, name: &str) -> bool {
        Operation::resolve(agent_type, name)
            .map(|op| self.handlers.contains_key(&op))
            .unwrap_or(false)
    }

    /// Registered operation names of one agent type, sorted
    pub fn operations_for(&self, agent_type: AgentType) -> Vec<&'static str> {
        let mut names: Vec<_> = self
            .handlers
            .keys()
            .filter(|op| op.agent_type() == agent_type)
            .map(|op| op.name())
            .collect();
        names.sort_unstable();
        names
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
