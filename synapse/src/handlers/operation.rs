//! Operation sets per agent type
//!
//! Each agent type has its own operation enum, and [`Operation`] is the
//! tagged union over them. A handler is registered under an `Operation`,
//! so an operation can only ever be reached through the type that owns it.

use std::fmt;

use crate::agents::AgentType;

macro_rules! operation_set {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            /// Every operation of this set
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Wire name of the operation
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }

            /// Look up an operation by wire name
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($wire => Some($name::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

operation_set! {
    /// Operations of `insights` agents
    InsightsOp {
        /// Build a dashboard payload for a hospital and period
        GenerateDashboard => "generate_dashboard",
        PredictClinicalOutcomes => "predict_clinical_outcomes",
        AnalyzeResourceUtilization => "analyze_resource_utilization",
    }
}

operation_set! {
    /// Operations of `manage` agents
    ManageOp {
        /// Register a patient's arrival and queue position
        DigitalCheckin => "digital_checkin",
        PredictWaitTime => "predict_wait_time",
        ClassifyTriage => "classify_triage",
        OptimizeResources => "optimize_resources",
    }
}

operation_set! {
    /// Operations of `make` agents
    MakeOp {
        /// Extract normalized text from a document's text layer
        OcrDocument => "ocr_document",
        ExtractMedicalEntities => "extract_medical_entities",
        SummarizeDocument => "summarize_document",
    }
}

operation_set! {
    /// Operations of `market` agents
    MarketOp {
        /// Queue an appointment reminder for delivery
        SendReminder => "send_reminder",
        AnalyzeMarketTrends => "analyze_market_trends",
        ForecastDemand => "forecast_demand",
    }
}

operation_set! {
    /// Operations of `integration` agents
    IntegrationOp {
        /// Validate and link an ABHA health ID
        AbhaIntegration => "abha_integration",
        CheckCompatibility => "check_compatibility",
        ConvertDataFormat => "convert_data_format",
    }
}

/// An operation, tagged by the agent type that owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    Insights(InsightsOp),
    Manage(ManageOp),
    Make(MakeOp),
    Market(MarketOp),
    Integration(IntegrationOp),
}

impl Operation {
    /// Resolve an operation name within one agent type's set
    pub fn resolve(agent_type: AgentType, name: &str) -> Option<Self> {
        match agent_type {
            AgentType::Insights => InsightsOp::from_name(name).map(Self::Insights),
            AgentType::Manage => ManageOp::from_name(name).map(Self::Manage),
            AgentType::Make => MakeOp::from_name(name).map(Self::Make),
            AgentType::Market => MarketOp::from_name(name).map(Self::Market),
            AgentType::Integration => IntegrationOp::from_name(name).map(Self::Integration),
        }
    }

    /// The agent type owning this operation
    pub fn agent_type(&self) -> AgentType {
        match self {
            Self::Insights(_) => AgentType::Insights,
            Self::Manage(_) => AgentType::Manage,
            Self::Make(_) => AgentType::Make,
            Self::Market(_) => AgentType::Market,
            Self::Integration(_) => AgentType::Integration,
        }
    }

    /// Wire name of the operation
    pub fn name(&self) -> &'static str {
        match self {
            Self::Insights(op) => op.as_str(),
            Self::Manage(op) => op.as_str(),
            Self::Make(op) => op.as_str(),
            Self::Market(op) => op.as_str(),
            Self::Integration(op) => op.as_str(),
        }
    }

    /// Every operation of one agent type
    pub fn for_type(agent_type: AgentType) -> Vec<Operation> {
        match agent_type {
            AgentType::Insights => InsightsOp::ALL.iter().map(|op| Self::Insights(*op)).collect(),
            AgentType::Manage => ManageOp::ALL.iter().map(|op| Self::Manage(*op)).collect(),
            AgentType::Make => MakeOp::ALL.iter().map(|op| Self::Make(*op)).collect(),
            AgentType::Market => MarketOp::ALL.iter().map(|op| Self::Market(*op)).collect(),
            AgentType::Integration => {
                IntegrationOp::ALL.iter().map(|op| Self::Integration(*op)).collect()
            }
        }
    }

    /// Every operation of every type
    pub fn all() -> Vec<Operation> {
        AgentType::ALL.into_iter().flat_map(Self::for_type).collect()
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.agent_type(), self.name())
    }
}

impl From<InsightsOp> for Operation {
    fn from(op: InsightsOp) -> Self {
        Self::Insights(op)
    }
}

impl From<ManageOp> for Operation {
    fn from(op: ManageOp) -> Self {
        Self::Manage(op)
    }
}

impl From<MakeOp> for Operation {
    fn from(op: MakeOp) -> Self {
        Self::Make(op)
    }
}

impl From<MarketOp> for Operation {
    fn from(op: MarketOp) -> Self {
        Self::Market(op)
    }
}

impl From<IntegrationOp> for Operation {
    fn from(op: IntegrationOp) -> Self {
        Self::Integration(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_within_type() {
        assert_eq!(
            Operation::resolve(AgentType::Insights, "generate_dashboard"),
            Some(Operation::Insights(InsightsOp::GenerateDashboard))
        );
        assert_eq!(
            Operation::resolve(AgentType::Manage, "digital_checkin"),
            Some(Operation::Manage(ManageOp::DigitalCheckin))
        );
    }

    #[test]
    fn test_operations_do_not_leak_across_types() {
        for op in Operation::all() {
            for agent_type in AgentType::ALL {
                let resolved = Operation::resolve(agent_type, op.name());
                if agent_type == op.agent_type() {
                    assert_eq!(resolved, Some(op));
                } else {
                    assert_eq!(resolved, None, "{} resolved under {}", op, agent_type);
                }
            }
        }
    }

    #[test]
    fn test_display() {
        let op: Operation = MakeOp::OcrDocument.into();
        assert_eq!(op.to_string(), "make.ocr_document");
    }
}
