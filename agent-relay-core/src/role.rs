//! Agent roles, the addressing scheme for every message, status entry and
//! registry lookup.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Logical identity of an agent in the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Orchestrator,
    Planning,
    TestCreation,
    Review,
    Execution,
    Reporting,
    Discovery,
}

impl AgentRole {
    /// Every role, in declaration order
    pub const ALL: [AgentRole; 7] = [
        AgentRole::Orchestrator,
        AgentRole::Planning,
        AgentRole::TestCreation,
        AgentRole::Review,
        AgentRole::Execution,
        AgentRole::Reporting,
        AgentRole::Discovery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Orchestrator => "orchestrator",
            AgentRole::Planning => "planning",
            AgentRole::TestCreation => "test_creation",
            AgentRole::Review => "review",
            AgentRole::Execution => "execution",
            AgentRole::Reporting => "reporting",
            AgentRole::Discovery => "discovery",
        }
    }

    /// Capabilities assumed for a role registered without an explicit list
    pub fn default_capabilities(&self) -> &'static [&'static str] {
        match self {
            AgentRole::Orchestrator => &[
                "workflow_management",
                "agent_coordination",
                "resource_allocation",
                "status_monitoring",
            ],
            AgentRole::Planning => &[
                "test_strategy_creation",
                "requirement_analysis",
                "risk_assessment",
                "test_planning",
                "coverage_analysis",
            ],
            AgentRole::TestCreation => &[
                "code_generation",
                "test_automation",
                "framework_integration",
                "data_preparation",
                "environment_setup",
            ],
            AgentRole::Review => &[
                "code_review",
                "quality_assessment",
                "best_practices_validation",
                "security_analysis",
                "performance_review",
            ],
            AgentRole::Execution => &[
                "test_execution",
                "environment_management",
                "result_collection",
                "error_handling",
                "parallel_execution",
            ],
            AgentRole::Reporting => &[
                "report_generation",
                "data_analysis",
                "visualization",
                "trend_analysis",
                "strategic_insights",
            ],
            AgentRole::Discovery => &[],
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        AgentRole::ALL
            .iter()
            .copied()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| Error::validation(format!("Unknown agent role: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        for role in AgentRole::ALL {
            assert_eq!(role.as_str().parse::<AgentRole>().unwrap(), role);
        }
        assert!("tester".parse::<AgentRole>().is_err());
    }

    #[test]
    fn test_role_serializes_as_snake_case() {
        let json = serde_json::to_string(&AgentRole::TestCreation).unwrap();
        assert_eq!(json, "\"test_creation\"");
    }

    #[test]
    fn test_discovery_has_no_default_capabilities() {
        assert!(AgentRole::Discovery.default_capabilities().is_empty());
        assert!(AgentRole::Review
            .default_capabilities()
            .contains(&"code_review"));
    }
}
