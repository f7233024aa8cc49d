//! Agent registry: one live handle and one status record per role

use agent_relay_core::agent::{Agent, AgentState, AgentStatus};
use agent_relay_core::AgentRole;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

struct Entry {
    agent: Option<Arc<dyn Agent>>,
    status: AgentStatus,
    /// Position of the first registration, used to break workload ties
    order: u64,
}

/// Registry of agents keyed by role
#[derive(Default)]
pub struct AgentRegistry {
    entries: RwLock<HashMap<AgentRole, Entry>>,
    next_order: AtomicU64,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the handle for a role.
    ///
    /// Status is reset to idle with zero workload. Performance counters and
    /// the original registration order survive re-registration.
    pub fn register(
        &self,
        role: AgentRole,
        agent: Arc<dyn Agent>,
        capabilities: Option<Vec<String>>,
    ) {
        let capabilities = capabilities.unwrap_or_else(|| {
            role.default_capabilities()
                .iter()
                .map(|c| c.to_string())
                .collect()
        });

        let mut entries = self.entries.write();
        match entries.get_mut(&role) {
            Some(entry) => {
                let performance = entry.status.performance.clone();
                entry.agent = Some(agent);
                entry.status = AgentStatus::new(role, capabilities);
                entry.status.performance = performance;
                info!(role = %role, "Agent re-registered");
            }
            None => {
                let order = self.next_order.fetch_add(1, Ordering::SeqCst);
                entries.insert(
                    role,
                    Entry {
                        agent: Some(agent),
                        status: AgentStatus::new(role, capabilities),
                        order,
                    },
                );
                info!(role = %role, "Agent registered");
            }
        }
    }

    /// Drop the handle and mark the role offline. Returns false if the role
    /// had no live handle.
    pub fn unregister(&self, role: AgentRole) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(&role) {
            Some(entry) if entry.agent.is_some() => {
                entry.agent = None;
                entry.status.state = AgentState::Offline;
                entry.status.current_task = None;
                entry.status.workload = 0;
                entry.status.touch();
                info!(role = %role, "Agent unregistered");
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, role: AgentRole) -> Option<Arc<dyn Agent>> {
        self.entries
            .read()
            .get(&role)
            .and_then(|entry| entry.agent.clone())
    }

    pub fn is_registered(&self, role: AgentRole) -> bool {
        self.get(role).is_some()
    }

    /// Status of a role, including offline roles that were registered once
    pub fn status(&self, role: AgentRole) -> Option<AgentStatus> {
        self.entries.read().get(&role).map(|e| e.status.clone())
    }

    /// All status records in registration order
    pub fn statuses(&self) -> Vec<AgentStatus> {
        let entries = self.entries.read();
        let mut all: Vec<&Entry> = entries.values().collect();
        all.sort_by_key(|e| e.order);
        all.into_iter().map(|e| e.status.clone()).collect()
    }

    /// Roles with a live handle, in registration order
    pub fn roles(&self) -> Vec<AgentRole> {
        let entries = self.entries.read();
        let mut live: Vec<(u64, AgentRole)> = entries
            .iter()
            .filter(|(_, e)| e.agent.is_some())
            .map(|(role, e)| (e.order, *role))
            .collect();
        live.sort();
        live.into_iter().map(|(_, role)| role).collect()
    }

    pub fn len(&self) -> usize {
        self.roles().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Partial status update. Last activity is refreshed on every call.
    /// Returns false for a role that was never registered.
    pub fn update_status(
        &self,
        role: AgentRole,
        state: AgentState,
        current_task: Option<String>,
        workload: Option<u32>,
    ) -> bool {
        let mut entries = self.entries.write();
        let Some(entry) = entries.get_mut(&role) else {
            return false;
        };

        entry.status.state = state;
        if let Some(task) = current_task {
            entry.status.current_task = Some(task);
        }
        if let Some(workload) = workload {
            entry.status.workload = workload;
        }
        entry.status.touch();
        debug!(role = %role, state = %state, "Agent status updated");
        true
    }

    /// Mark a role busy with one more task in hand
    pub fn begin_task(&self, role: AgentRole, label: &str) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(&role) {
            entry.status.state = AgentState::Busy;
            entry.status.current_task = Some(label.to_string());
            entry.status.workload = entry.status.workload.saturating_add(1);
            entry.status.touch();
        }
    }

    /// Release one task; the role returns to idle once its workload is zero
    pub fn finish_task(&self, role: AgentRole, duration: Duration, success: bool) {
        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(&role) {
            let status = &mut entry.status;
            status.workload = status.workload.saturating_sub(1);
            if status.workload == 0 && status.state == AgentState::Busy {
                status.state = AgentState::Idle;
                status.current_task = None;
            }
            status
                .performance
                .record(duration.as_millis() as u64, success);
            status.touch();
        }
    }

    /// Fold a finished task into the role's performance counters
    pub fn record_task(&self, role: AgentRole, duration: Duration, success: bool) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(&role) {
            Some(entry) => {
                entry
                    .status
                    .performance
                    .record(duration.as_millis() as u64, success);
                entry.status.touch();
                true
            }
            None => false,
        }
    }

    /// Roles whose capabilities are a superset of `required`, restricted to
    /// idle or busy agents, least loaded first
    pub fn find_capable<S: AsRef<str>>(&self, required: &[S]) -> Vec<AgentRole> {
        let entries = self.entries.read();
        let mut capable: Vec<(u32, u64, AgentRole)> = entries
            .iter()
            .filter(|(_, e)| {
                e.agent.is_some()
                    && e.status.is_available()
                    && e.status.has_all_capabilities(required)
            })
            .map(|(role, e)| (e.status.workload, e.order, *role))
            .collect();
        capable.sort();
        capable.into_iter().map(|(_, _, role)| role).collect()
    }
}
