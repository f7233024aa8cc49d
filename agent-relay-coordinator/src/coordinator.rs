//! Coordinator facade owning the shared coordination state

use crate::bus::{BusStats, MessageBus};
use crate::collaboration::{CollaborationManager, CollaborationStats};
use crate::command_agent::CommandAgent;
use crate::config::CoordinatorConfig;
use crate::orchestrator::WorkflowOrchestrator;
use crate::registry::AgentRegistry;
use crate::resources::ResourceArbiter;
use agent_relay_core::agent::{Agent, AgentState};
use agent_relay_core::{AgentRole, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Unhealthy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentHealth {
    pub role: AgentRole,
    pub state: AgentState,
    pub responsive: bool,
    pub idle_seconds: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub agents: Vec<AgentHealth>,
    pub queue_size: usize,
    pub stuck_collaborations: Vec<Uuid>,
    pub issues: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentUtilization {
    pub role: AgentRole,
    pub state: AgentState,
    pub workload: u32,
    pub tasks_completed: u64,
    pub success_rate: f64,
    pub average_task_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationMetrics {
    pub messages: BusStats,
    pub collaborations: CollaborationStats,
    pub registered_agents: usize,
    pub agents: Vec<AgentUtilization>,
}

/// Owns the registry, bus, collaboration manager and resource arbiter.
///
/// Construct one per process and share it by reference; orchestrators are
/// built from it and share its registry.
pub struct Coordinator {
    config: CoordinatorConfig,
    registry: Arc<AgentRegistry>,
    bus: Arc<MessageBus>,
    collaborations: CollaborationManager,
    resources: ResourceArbiter,
}

impl Coordinator {
    /// Must be called from within a Tokio runtime
    pub fn new(config: CoordinatorConfig) -> Self {
        let registry = Arc::new(AgentRegistry::new());
        let bus = Arc::new(MessageBus::new(Arc::clone(&registry), config.bus.clone()));
        let collaborations =
            CollaborationManager::new(Arc::clone(&bus), config.collaboration.history_limit);

        info!("Coordinator initialized");
        Self {
            config,
            registry,
            bus,
            collaborations,
            resources: ResourceArbiter::new(),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    pub fn collaborations(&self) -> &CollaborationManager {
        &self.collaborations
    }

    pub fn resources(&self) -> &ResourceArbiter {
        &self.resources
    }

    pub fn register_agent(
        &self,
        role: AgentRole,
        agent: Arc<dyn Agent>,
        capabilities: Option<Vec<String>>,
    ) {
        self.registry.register(role, agent, capabilities);
    }

    /// Register a [`CommandAgent`] for every configured role, in role name
    /// order. Returns the roles in that order.
    pub fn register_command_agents(&self) -> Result<Vec<AgentRole>> {
        let mut roles = Vec::new();
        for (name, command) in &self.config.agents {
            let role: AgentRole = name.parse()?;
            let agent = CommandAgent::new(role, command.clone());
            let capabilities = agent.capabilities();
            self.registry.register(role, Arc::new(agent), capabilities);
            roles.push(role);
        }
        Ok(roles)
    }

    /// Orchestrator sharing this coordinator's registry
    pub fn orchestrator(&self) -> WorkflowOrchestrator {
        WorkflowOrchestrator::new(Arc::clone(&self.registry), self.config.workflow.clone())
    }

    /// Fail collaborations older than the configured session TTL
    pub fn expire_stale_collaborations(&self) -> Vec<Uuid> {
        self.collaborations
            .expire_stale(Duration::from_secs(self.config.collaboration.session_ttl_secs))
    }

    /// Agent responsiveness, queue pressure and stuck collaborations
    pub fn health_check(&self) -> HealthReport {
        let unresponsive_after = self.config.health.unresponsive_after_secs as i64;
        let mut status = HealthStatus::Healthy;
        let mut issues = Vec::new();

        let agents: Vec<AgentHealth> = self
            .registry
            .statuses()
            .into_iter()
            .filter(|s| s.state != AgentState::Offline)
            .map(|s| AgentHealth {
                role: s.role,
                state: s.state,
                responsive: s.is_responsive(unresponsive_after),
                idle_seconds: s.idle_seconds(),
            })
            .collect();

        for agent in &agents {
            if agent.state == AgentState::Error {
                status = HealthStatus::Unhealthy;
                issues.push(format!("Agent {} is in error state", agent.role));
            } else if !agent.responsive {
                status = status.max(HealthStatus::Warning);
                issues.push(format!(
                    "Agent {} has been inactive for {}s",
                    agent.role, agent.idle_seconds
                ));
            }
        }

        let queue_size = self.bus.queue_len();
        if queue_size > self.config.health.queue_warning_threshold {
            status = status.max(HealthStatus::Warning);
            issues.push(format!("Message queue is large: {} pending", queue_size));
        }

        let stuck_collaborations = self
            .collaborations
            .stale(Duration::from_secs(self.config.collaboration.session_ttl_secs));
        if !stuck_collaborations.is_empty() {
            status = status.max(HealthStatus::Warning);
            issues.push(format!(
                "{} collaboration(s) active longer than {}s",
                stuck_collaborations.len(),
                self.config.collaboration.session_ttl_secs
            ));
        }

        if status != HealthStatus::Healthy {
            warn!(status = ?status, issues = issues.len(), "Coordination health degraded");
        }

        HealthReport {
            status,
            agents,
            queue_size,
            stuck_collaborations,
            issues,
            checked_at: Utc::now(),
        }
    }

    pub fn metrics(&self) -> CoordinationMetrics {
        let agents: Vec<AgentUtilization> = self
            .registry
            .statuses()
            .into_iter()
            .map(|s| AgentUtilization {
                role: s.role,
                state: s.state,
                workload: s.workload,
                tasks_completed: s.performance.tasks_completed,
                success_rate: s.performance.success_rate,
                average_task_ms: s.performance.average_task_ms,
            })
            .collect();

        CoordinationMetrics {
            messages: self.bus.stats(),
            collaborations: self.collaborations.stats(),
            registered_agents: self.registry.len(),
            agents,
        }
    }

    /// Stop message delivery
    pub fn shutdown(&self) {
        self.bus.shutdown();
        info!("Coordinator shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentCommandConfig;
    use agent_relay_core::message::Payload;
    use std::collections::HashMap;

    #[tokio::test]
    async fn test_empty_coordinator_is_healthy() {
        let coordinator = Coordinator::new(CoordinatorConfig::default());
        let report = coordinator.health_check();
        assert_eq!(report.status, HealthStatus::Healthy);
        assert!(report.issues.is_empty());

        let metrics = coordinator.metrics();
        assert_eq!(metrics.registered_agents, 0);
        assert_eq!(metrics.messages.sent, 0);
    }

    #[tokio::test]
    async fn test_command_agents_register_in_name_order() {
        let mut config = CoordinatorConfig::default();
        for name in ["review", "planning", "execution"] {
            config.agents.insert(
                name.to_string(),
                AgentCommandConfig {
                    command: format!("{}-agent", name),
                    args: vec![],
                    env: HashMap::new(),
                    timeout_secs: 5,
                    capabilities: None,
                },
            );
        }
        let coordinator = Coordinator::new(config);

        let expected = vec![AgentRole::Execution, AgentRole::Planning, AgentRole::Review];
        assert_eq!(coordinator.register_command_agents().unwrap(), expected);
        assert_eq!(coordinator.registry().roles(), expected);
    }

    #[tokio::test]
    async fn test_error_state_is_unhealthy() {
        let mut config = CoordinatorConfig::default();
        config.agents.insert(
            "review".to_string(),
            AgentCommandConfig {
                command: "review-agent".to_string(),
                args: vec![],
                env: HashMap::new(),
                timeout_secs: 5,
                capabilities: Some(vec!["code_review".to_string()]),
            },
        );
        let coordinator = Coordinator::new(config);
        assert_eq!(
            coordinator.register_command_agents().unwrap(),
            vec![AgentRole::Review]
        );
        let status = coordinator.registry().status(AgentRole::Review).unwrap();
        assert_eq!(status.capabilities, vec!["code_review"]);

        coordinator
            .registry()
            .update_status(AgentRole::Review, AgentState::Error, None, None);
        let report = coordinator.health_check();
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.agents.len(), 1);
    }

    #[tokio::test]
    async fn test_stuck_collaboration_warns_and_expires() {
        let mut config = CoordinatorConfig::default();
        config.collaboration.session_ttl_secs = 0;
        let coordinator = Coordinator::new(config);
        coordinator.bus().pause();

        let id = coordinator
            .collaborations()
            .request(AgentRole::Planning, &[AgentRole::Review], "stuck", Payload::new())
            .unwrap();

        let report = coordinator.health_check();
        assert_eq!(report.status, HealthStatus::Warning);
        assert_eq!(report.stuck_collaborations, vec![id]);

        assert_eq!(coordinator.expire_stale_collaborations(), vec![id]);
        assert_eq!(coordinator.metrics().collaborations.failed, 1);
    }

    #[tokio::test]
    async fn test_queue_warning() {
        let mut config = CoordinatorConfig::default();
        config.health.queue_warning_threshold = 1;
        let coordinator = Coordinator::new(config);
        coordinator.bus().pause();

        for _ in 0..3 {
            coordinator
                .bus()
                .send(
                    AgentRole::Planning,
                    AgentRole::Review,
                    agent_relay_core::message::MessageContent::Broadcast {
                        payload: Payload::new(),
                    },
                    agent_relay_core::message::MessagePriority::Low,
                    None,
                )
                .unwrap();
        }

        let report = coordinator.health_check();
        assert_eq!(report.status, HealthStatus::Warning);
        assert_eq!(report.queue_size, 3);
        assert_eq!(coordinator.metrics().messages.queued, 3);
    }
}
