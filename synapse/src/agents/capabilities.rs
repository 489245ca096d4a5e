//! Agent Capabilities
//!
//! Defines the capability tags agents can declare and which tags each agent
//! type is allowed to carry. Capabilities are checked once, at registration
//! and on update; dispatch never consults them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use super::{AgentError, AgentType};

/// Capability tags, grouped by the agent type that owns them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    // Insights
    Analytics,
    Dashboards,
    Reporting,
    OutcomePrediction,
    ResourceAnalysis,

    // Manage
    Checkin,
    QueueManagement,
    Triage,
    WaitTimePrediction,
    ResourceOptimization,

    // Make
    Ocr,
    DocumentProcessing,
    EntityExtraction,
    Summarization,
    Transcription,

    // Market
    Reminders,
    Notifications,
    Campaigns,
    MarketAnalysis,
    DemandForecasting,

    // Integration
    Abha,
    HealthRecords,
    Interoperability,
    DataConversion,
    ApiIntegration,
}

impl Capability {
    /// Wire tag of the capability
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analytics => "analytics",
            Self::Dashboards => "dashboards",
            Self::Reporting => "reporting",
            Self::OutcomePrediction => "outcome_prediction",
            Self::ResourceAnalysis => "resource_analysis",

            Self::Checkin => "checkin",
            Self::QueueManagement => "queue_management",
            Self::Triage => "triage",
            Self::WaitTimePrediction => "wait_time_prediction",
            Self::ResourceOptimization => "resource_optimization",

            Self::Ocr => "ocr",
            Self::DocumentProcessing => "document_processing",
            Self::EntityExtraction => "entity_extraction",
            Self::Summarization => "summarization",
            Self::Transcription => "transcription",

            Self::Reminders => "reminders",
            Self::Notifications => "notifications",
            Self::Campaigns => "campaigns",
            Self::MarketAnalysis => "market_analysis",
            Self::DemandForecasting => "demand_forecasting",

            Self::Abha => "abha",
            Self::HealthRecords => "health_records",
            Self::Interoperability => "interoperability",
            Self::DataConversion => "data_conversion",
            Self::ApiIntegration => "api_integration",
        }
    }

    /// Get human-readable description of capability
    pub fn description(&self) -> &'static str {
        match self {
            Self::Analytics => "Aggregate hospital and patient statistics",
            Self::Dashboards => "Build dashboard payloads",
            Self::Reporting => "Produce periodic reports",
            Self::OutcomePrediction => "Estimate clinical outcomes and risk factors",
            Self::ResourceAnalysis => "Analyze bed, staff and room utilization",

            Self::Checkin => "Digital patient check-in",
            Self::QueueManagement => "Manage waiting queues",
            Self::Triage => "Classify patient urgency",
            Self::WaitTimePrediction => "Predict waiting times",
            Self::ResourceOptimization => "Recommend staff and room allocation",

            Self::Ocr => "Extract text from scanned documents",
            Self::DocumentProcessing => "Normalize clinical documents",
            Self::EntityExtraction => "Extract medical entities from text",
            Self::Summarization => "Summarize clinical documents",
            Self::Transcription => "Validate and clean transcriptions",

            Self::Reminders => "Send appointment reminders",
            Self::Notifications => "Deliver patient notifications",
            Self::Campaigns => "Run outreach campaigns",
            Self::MarketAnalysis => "Analyze market and competitor trends",
            Self::DemandForecasting => "Forecast service demand",

            Self::Abha => "Link and verify ABHA health IDs",
            Self::HealthRecords => "Exchange health records",
            Self::Interoperability => "Check system compatibility",
            Self::DataConversion => "Convert between record formats",
            Self::ApiIntegration => "Call external health APIs",
        }
    }

    /// The agent type this capability belongs to
    pub fn owner(&self) -> AgentType {
        match self {
            Self::Analytics
            | Self::Dashboards
            | Self::Reporting
            | Self::OutcomePrediction
            | Self::ResourceAnalysis => AgentType::Insights,

            Self::Checkin
            | Self::QueueManagement
            | Self::Triage
            | Self::WaitTimePrediction
            | Self::ResourceOptimization => AgentType::Manage,

            Self::Ocr
            | Self::DocumentProcessing
            | Self::EntityExtraction
            | Self::Summarization
            | Self::Transcription => AgentType::Make,

            Self::Reminders
            | Self::Notifications
            | Self::Campaigns
            | Self::MarketAnalysis
            | Self::DemandForecasting => AgentType::Market,

            Self::Abha
            | Self::HealthRecords
            | Self::Interoperability
            | Self::DataConversion
            | Self::ApiIntegration => AgentType::Integration,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tag = s.trim().to_lowercase();
        Capability::ALL
            .iter()
            .copied()
            .find(|cap| cap.as_str() == tag)
            .ok_or_else(|| AgentError::Validation(format!("unknown capability '{}'", s)))
    }
}

impl Capability {
    /// Every capability tag
    pub const ALL: [Capability; 25] = [
        Capability::Analytics,
        Capability::Dashboards,
        Capability::Reporting,
        Capability::OutcomePrediction,
        Capability::ResourceAnalysis,
        Capability::Checkin,
        Capability::QueueManagement,
        Capability::Triage,
        Capability::WaitTimePrediction,
        Capability::ResourceOptimization,
        Capability::Ocr,
        Capability::DocumentProcessing,
        Capability::EntityExtraction,
        Capability::Summarization,
        Capability::Transcription,
        Capability::Reminders,
        Capability::Notifications,
        Capability::Campaigns,
        Capability::MarketAnalysis,
        Capability::DemandForecasting,
        Capability::Abha,
        Capability::HealthRecords,
        Capability::Interoperability,
        Capability::DataConversion,
        Capability::ApiIntegration,
    ];
}

impl AgentType {
    /// Capabilities an agent of this type may declare
    pub fn allowed_capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL
            .into_iter()
            .filter(move |cap| cap.owner() == *self)
    }

    /// Whether `capability` is allowed for this type
    pub fn allows(&self, capability: Capability) -> bool {
        capability.owner() == *self
    }
}

/// Parse raw capability tags and check them against the type's allowed set
pub fn validate_capabilities<S: AsRef<str>>(
    agent_type: AgentType,
    tags: &[S],
) -> Result<BTreeSet<Capability>, AgentError> {
    let mut capabilities = BTreeSet::new();

    for tag in tags {
        let capability: Capability = tag.as_ref().parse()?;
        if !agent_type.allows(capability) {
            return Err(AgentError::Validation(format!(
                "capability '{}' is not allowed for agent type '{}'",
                capability, agent_type
            )));
        }
        capabilities.insert(capability);
    }

    Ok(capabilities)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_description() {
        assert_eq!(Capability::Ocr.description(), "Extract text from scanned documents");
    }

    #[test]
    fn test_every_type_owns_five_capabilities() {
        for agent_type in AgentType::ALL {
            assert_eq!(agent_type.allowed_capabilities().count(), 5, "{}", agent_type);
        }
    }

    #[test]
    fn test_tag_round_trip() {
        for cap in Capability::ALL {
            assert_eq!(cap.as_str().parse::<Capability>().unwrap(), cap);
            let json = serde_json::to_value(cap).unwrap();
            assert_eq!(json, serde_json::json!(cap.as_str()));
        }
    }

    #[test]
    fn test_validate_capabilities() {
        let caps = validate_capabilities(AgentType::Insights, &["analytics", "dashboards", "analytics"])
            .unwrap();
        assert_eq!(caps.len(), 2);

        let err = validate_capabilities(AgentType::Insights, &["ocr"]).unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));

        let err = validate_capabilities(AgentType::Make, &["teleportation"]).unwrap_err();
        assert!(matches!(err, AgentError::Validation(_)));
    }
}
