//! Agent contract and status model
//!
//! An agent is anything that can turn a [`Task`] into a [`TaskResult`].
//! What it does internally (calling a model, running a subprocess,
//! rendering files) is invisible to the coordinator, which only tracks an
//! [`AgentStatus`] per registered role.
//!
//! # Examples
//!
//! ```rust
//! use agent_relay_core::agent::*;
//! use agent_relay_core::AgentRole;
//!
//! let mut status = AgentStatus::new(AgentRole::Review, vec!["code_review".to_string()]);
//! assert!(status.is_available());
//!
//! status.performance.record(120, true);
//! status.performance.record(80, false);
//! assert_eq!(status.performance.tasks_completed, 2);
//! assert_eq!(status.performance.success_rate, 50.0);
//! ```

use crate::role::AgentRole;
use crate::task::{Task, TaskResult};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The single operation every agent exposes
#[async_trait]
pub trait Agent: Send + Sync {
    async fn process(&self, task: Task) -> Result<TaskResult>;
}

/// Lifecycle state of a registered role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Busy,
    Error,
    Offline,
}

impl AgentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Idle => "idle",
            AgentState::Busy => "busy",
            AgentState::Error => "error",
            AgentState::Offline => "offline",
        }
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rolling performance counters, kept across re-registration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PerformanceMetrics {
    pub tasks_completed: u64,
    pub successful_tasks: u64,
    pub average_task_ms: f64,
    /// Percentage of successful tasks
    pub success_rate: f64,
    pub error_count: u64,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            tasks_completed: 0,
            successful_tasks: 0,
            average_task_ms: 0.0,
            success_rate: 100.0,
            error_count: 0,
        }
    }
}

impl PerformanceMetrics {
    /// Fold one finished task into the counters
    pub fn record(&mut self, duration_ms: u64, success: bool) {
        self.tasks_completed += 1;
        let n = self.tasks_completed as f64;
        self.average_task_ms += (duration_ms as f64 - self.average_task_ms) / n;

        if success {
            self.successful_tasks += 1;
        } else {
            self.error_count += 1;
        }
        self.success_rate = self.successful_tasks as f64 / n * 100.0;
    }
}

/// Mutable status record of one registered role
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentStatus {
    pub role: AgentRole,
    pub state: AgentState,
    pub current_task: Option<String>,
    pub workload: u32,
    pub last_activity: DateTime<Utc>,
    pub capabilities: Vec<String>,
    pub performance: PerformanceMetrics,
}

impl AgentStatus {
    /// Fresh idle status with zero workload
    pub fn new(role: AgentRole, capabilities: Vec<String>) -> Self {
        Self {
            role,
            state: AgentState::Idle,
            current_task: None,
            workload: 0,
            last_activity: Utc::now(),
            capabilities,
            performance: PerformanceMetrics::default(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Idle or busy agents can still take work
    pub fn is_available(&self) -> bool {
        matches!(self.state, AgentState::Idle | AgentState::Busy)
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    pub fn has_all_capabilities<S: AsRef<str>>(&self, required: &[S]) -> bool {
        required.iter().all(|cap| self.has_capability(cap.as_ref()))
    }

    pub fn idle_seconds(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.last_activity)
            .num_seconds()
    }

    /// Seen within the given window
    pub fn is_responsive(&self, max_idle_seconds: i64) -> bool {
        self.idle_seconds() <= max_idle_seconds
    }
}
