//! Agent Lifecycle Management
//!
//! Legal status transitions for a registered agent. Only the training
//! manager moves an agent between states, and it always does so through the
//! store's compare-and-set, which consults this table.
//!
//! ```text
//! created ──▶ training ──▶ ready
//!    ▲            │  ▲       │
//!    └────────────┘  └───────┘
//! ```

use super::AgentStatus;

impl AgentStatus {
    /// Whether the lifecycle permits moving from `self` to `next`
    pub fn can_transition_to(self, next: AgentStatus) -> bool {
        use AgentStatus::*;

        matches!(
            (self, next),
            // Training starts from a fresh or an already trained agent
            (Created, Training)
                | (Ready, Training)
                // Successful training
                | (Training, Ready)
                // Failed training restores the previous status
                | (Training, Created)
        )
    }

    /// Whether executions may be dispatched without an explicit override
    pub fn accepts_executions(self) -> bool {
        self == AgentStatus::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        assert!(AgentStatus::Created.can_transition_to(AgentStatus::Training));
        assert!(AgentStatus::Training.can_transition_to(AgentStatus::Ready));
        assert!(AgentStatus::Ready.can_transition_to(AgentStatus::Training));
        assert!(AgentStatus::Training.can_transition_to(AgentStatus::Created));
    }

    #[test]
    fn test_forbidden_transitions() {
        assert!(!AgentStatus::Created.can_transition_to(AgentStatus::Ready));
        assert!(!AgentStatus::Ready.can_transition_to(AgentStatus::Created));
        assert!(!AgentStatus::Training.can_transition_to(AgentStatus::Training));
    }

    #[test]
    fn test_only_ready_accepts_executions() {
        assert!(AgentStatus::Ready.accepts_executions());
        assert!(!AgentStatus::Created.accepts_executions());
        assert!(!AgentStatus::Training.accepts_executions());
    }
}
