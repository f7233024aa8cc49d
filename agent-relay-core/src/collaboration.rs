//! Collaboration sessions: open-ended multi-party exchanges under one
//! correlation id

use crate::message::{AgentMessage, Payload};
use crate::role::AgentRole;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CollaborationStatus {
    Active,
    Completed,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollaborationSession {
    pub id: Uuid,
    /// Initiator first
    pub participants: Vec<AgentRole>,
    pub topic: String,
    pub context: Payload,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<AgentMessage>,
    pub status: CollaborationStatus,
    pub result: Option<Payload>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl CollaborationSession {
    /// Builds the participant list as the initiator followed by the peers,
    /// without duplicates
    pub fn new(initiator: AgentRole, peers: &[AgentRole], topic: String, context: Payload) -> Self {
        let mut participants = vec![initiator];
        for peer in peers {
            if !participants.contains(peer) {
                participants.push(*peer);
            }
        }

        Self {
            id: Uuid::new_v4(),
            participants,
            topic,
            context,
            created_at: Utc::now(),
            messages: Vec::new(),
            status: CollaborationStatus::Active,
            result: None,
            closed_at: None,
        }
    }

    pub fn initiator(&self) -> AgentRole {
        self.participants[0]
    }

    /// Everyone except the initiator
    pub fn peers(&self) -> &[AgentRole] {
        &self.participants[1..]
    }

    pub fn is_participant(&self, role: AgentRole) -> bool {
        self.participants.contains(&role)
    }

    pub fn is_active(&self) -> bool {
        self.status == CollaborationStatus::Active
    }

    pub fn age_seconds(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.created_at)
            .num_seconds()
    }

    pub fn complete(&mut self, result: Payload) {
        self.status = CollaborationStatus::Completed;
        self.result = Some(result);
        self.closed_at = Some(Utc::now());
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = CollaborationStatus::Failed {
            reason: reason.into(),
        };
        self.closed_at = Some(Utc::now());
    }
}
