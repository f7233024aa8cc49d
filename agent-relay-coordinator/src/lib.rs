//! Coordination runtime for Agent Relay
//!
//! [`Coordinator`] owns the agent registry, the message bus, collaboration
//! sessions and shared resources. [`WorkflowOrchestrator`] drives pipeline
//! runs against the same registry.

pub mod bus;
pub mod collaboration;
pub mod command_agent;
pub mod config;
pub mod coordinator;
pub mod orchestrator;
pub mod persistence;
pub mod registry;
pub mod resources;

pub use bus::{BusStats, HistoryFilter, MessageBus, PendingQueue};
pub use collaboration::{CollaborationManager, CollaborationStats};
pub use command_agent::CommandAgent;
pub use config::CoordinatorConfig;
pub use coordinator::{CoordinationMetrics, Coordinator, HealthReport, HealthStatus};
pub use orchestrator::{WorkflowOrchestrator, WorkflowStats};
pub use registry::AgentRegistry;
pub use resources::{DenyReason, Grant, ResourceArbiter};
