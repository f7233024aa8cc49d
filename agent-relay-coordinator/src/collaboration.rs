//! Collaboration session lifecycle

use crate::bus::MessageBus;
use agent_relay_core::collaboration::{CollaborationSession, CollaborationStatus};
use agent_relay_core::history::BoundedHistory;
use agent_relay_core::message::{AgentMessage, MessageContent, MessagePriority, Payload};
use agent_relay_core::{AgentRole, Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollaborationStats {
    pub active: usize,
    pub successful: u64,
    pub failed: u64,
    /// Percentage of closed sessions that completed
    pub success_rate: f64,
}

struct Closed {
    sessions: BoundedHistory<CollaborationSession>,
    successful: u64,
    failed: u64,
}

/// Tracks active sessions and archives closed ones
pub struct CollaborationManager {
    bus: Arc<MessageBus>,
    active: Mutex<HashMap<Uuid, CollaborationSession>>,
    closed: Mutex<Closed>,
}

impl CollaborationManager {
    pub fn new(bus: Arc<MessageBus>, history_limit: usize) -> Self {
        Self {
            bus,
            active: Mutex::new(HashMap::new()),
            closed: Mutex::new(Closed {
                sessions: BoundedHistory::new(history_limit),
                successful: 0,
                failed: 0,
            }),
        }
    }

    /// Open a session and send a high-priority collaboration request to
    /// every peer. Returns the session id.
    pub fn request(
        &self,
        initiator: AgentRole,
        peers: &[AgentRole],
        topic: impl Into<String>,
        context: Payload,
    ) -> Result<Uuid> {
        let topic = topic.into();
        if topic.trim().is_empty() {
            return Err(Error::validation("Collaboration topic cannot be empty"));
        }

        let mut session = CollaborationSession::new(initiator, peers, topic, context);
        if session.peers().is_empty() {
            return Err(Error::validation(
                "Collaboration needs at least one participant besides the initiator",
            ));
        }

        let mut outgoing = Vec::with_capacity(session.peers().len());
        for peer in session.peers().to_vec() {
            let message = AgentMessage::builder()
                .sender(initiator)
                .recipient(peer)
                .priority(MessagePriority::High)
                .correlation_id(session.id)
                .content(MessageContent::CollaborationRequest {
                    collaboration_id: session.id,
                    topic: session.topic.clone(),
                    context: session.context.clone(),
                    participants: session.participants.clone(),
                })
                .build()?;
            session.messages.push(message.clone());
            outgoing.push(message);
        }

        let id = session.id;
        info!(
            collaboration_id = %id,
            initiator = %initiator,
            participants = session.participants.len(),
            topic = %session.topic,
            "Collaboration requested"
        );

        // Peers may respond as soon as a request is delivered
        self.active.lock().insert(id, session);
        for message in outgoing {
            if let Err(e) = self.bus.send_message(message) {
                self.active.lock().remove(&id);
                warn!(collaboration_id = %id, error = %e, "Collaboration request could not be sent");
                return Err(e);
            }
        }
        Ok(id)
    }

    /// Record a participant's response. Returns false, without touching the
    /// session, for unknown sessions and non-participants.
    pub fn respond(&self, session_id: Uuid, role: AgentRole, response: Payload) -> bool {
        let mut active = self.active.lock();
        let Some(session) = active.get_mut(&session_id) else {
            warn!(collaboration_id = %session_id, role = %role, "Response to unknown collaboration");
            return false;
        };
        if !session.is_participant(role) {
            warn!(
                collaboration_id = %session_id,
                role = %role,
                "Response from non-participant rejected"
            );
            return false;
        }

        let message = AgentMessage::builder()
            .sender(role)
            .recipient(AgentRole::Orchestrator)
            .correlation_id(session_id)
            .content(MessageContent::CollaborationResponse {
                collaboration_id: session_id,
                response,
            })
            .build();

        match message {
            Ok(message) => {
                session.messages.push(message);
                debug!(collaboration_id = %session_id, role = %role, "Collaboration response recorded");
                true
            }
            Err(e) => {
                warn!(collaboration_id = %session_id, error = %e, "Invalid collaboration response");
                false
            }
        }
    }

    /// Close a session successfully. False for unknown or already closed ids.
    pub fn complete(&self, session_id: Uuid, result: Payload) -> bool {
        let Some(mut session) = self.active.lock().remove(&session_id) else {
            return false;
        };
        session.complete(result);
        info!(collaboration_id = %session_id, "Collaboration completed");
        self.archive(session);
        true
    }

    /// Close a session as failed. False for unknown or already closed ids.
    pub fn fail(&self, session_id: Uuid, reason: impl Into<String>) -> bool {
        let Some(mut session) = self.active.lock().remove(&session_id) else {
            return false;
        };
        let reason = reason.into();
        warn!(collaboration_id = %session_id, reason = %reason, "Collaboration failed");
        session.fail(reason);
        self.archive(session);
        true
    }

    /// Fail every active session older than `max_age`; returns their ids
    pub fn expire_stale(&self, max_age: Duration) -> Vec<Uuid> {
        let stale = self.stale(max_age);
        for id in &stale {
            self.fail(*id, format!("Expired after {}s without completion", max_age.as_secs()));
        }
        stale
    }

    /// Active sessions older than `max_age`
    pub fn stale(&self, max_age: Duration) -> Vec<Uuid> {
        let max_age = max_age.as_secs() as i64;
        self.active
            .lock()
            .values()
            .filter(|s| s.age_seconds() >= max_age)
            .map(|s| s.id)
            .collect()
    }

    /// Look a session up among active sessions, then in history
    pub fn get(&self, session_id: Uuid) -> Option<CollaborationSession> {
        if let Some(session) = self.active.lock().get(&session_id) {
            return Some(session.clone());
        }
        self.closed
            .lock()
            .sessions
            .iter()
            .find(|s| s.id == session_id)
            .cloned()
    }

    /// Active sessions, oldest first
    pub fn active(&self) -> Vec<CollaborationSession> {
        let mut sessions: Vec<_> = self.active.lock().values().cloned().collect();
        sessions.sort_by_key(|s| s.created_at);
        sessions
    }

    /// Closed sessions, newest first
    pub fn history(&self, limit: usize) -> Vec<CollaborationSession> {
        self.closed
            .lock()
            .sessions
            .newest_first()
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> CollaborationStats {
        let active = self.active.lock().len();
        let closed = self.closed.lock();
        let total = closed.successful + closed.failed;
        CollaborationStats {
            active,
            successful: closed.successful,
            failed: closed.failed,
            success_rate: if total > 0 {
                closed.successful as f64 / total as f64 * 100.0
            } else {
                0.0
            },
        }
    }

    fn archive(&self, session: CollaborationSession) {
        let mut closed = self.closed.lock();
        match session.status {
            CollaborationStatus::Completed => closed.successful += 1,
            CollaborationStatus::Failed { .. } => closed.failed += 1,
            CollaborationStatus::Active => {}
        }
        closed.sessions.push(session);
    }
}
