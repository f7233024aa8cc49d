//! Message domain model for lateral communication between agents
//!
//! Messages are addressed by [`AgentRole`] and carry a typed
//! [`MessageContent`]; the message type is derived from the content, so the
//! two can never disagree.
//!
//! # Examples
//!
//! ```rust
//! use agent_relay_core::message::*;
//! use agent_relay_core::AgentRole;
//!
//! let message = AgentMessage::builder()
//!     .sender(AgentRole::Review)
//!     .recipient(AgentRole::TestCreation)
//!     .content(MessageContent::Broadcast {
//!         payload: Payload::new(),
//!     })
//!     .priority(MessagePriority::High)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(message.message_type(), MessageType::Broadcast);
//! assert!(!message.is_delivered());
//! ```

use crate::agent::AgentState;
use crate::role::AgentRole;
use crate::task::{Task, TaskResult};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Free-form key/value section of a message or task
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// A message between two roles
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentMessage {
    pub id: Uuid,
    pub sender: AgentRole,
    pub recipient: AgentRole,
    pub priority: MessagePriority,
    pub content: MessageContent,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub processed_at: Option<DateTime<Utc>>,
    pub response_id: Option<Uuid>,
    pub correlation_id: Option<Uuid>,
}

/// Type of message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    TaskRequest,
    TaskResponse,
    StatusUpdate,
    ErrorNotification,
    CollaborationRequest,
    CollaborationResponse,
    ResourceRequest,
    ResourceResponse,
    Broadcast,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::TaskRequest => "task_request",
            MessageType::TaskResponse => "task_response",
            MessageType::StatusUpdate => "status_update",
            MessageType::ErrorNotification => "error_notification",
            MessageType::CollaborationRequest => "collaboration_request",
            MessageType::CollaborationResponse => "collaboration_response",
            MessageType::ResourceRequest => "resource_request",
            MessageType::ResourceResponse => "resource_response",
            MessageType::Broadcast => "broadcast",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Priority of a message; `Urgent` is delivered first
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

/// Typed content, one variant per message type
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    TaskRequest {
        task: Box<Task>,
    },
    TaskResponse {
        result: TaskResult,
    },
    StatusUpdate {
        state: AgentState,
        current_task: Option<String>,
        #[serde(default)]
        detail: Payload,
    },
    ErrorNotification {
        original_message_id: Uuid,
        error: String,
        timestamp: DateTime<Utc>,
    },
    CollaborationRequest {
        collaboration_id: Uuid,
        topic: String,
        context: Payload,
        participants: Vec<AgentRole>,
    },
    CollaborationResponse {
        collaboration_id: Uuid,
        response: Payload,
    },
    ResourceRequest {
        resource_name: String,
        exclusive: bool,
    },
    ResourceResponse {
        resource_name: String,
        granted: bool,
    },
    Broadcast {
        payload: Payload,
    },
}

impl MessageContent {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessageContent::TaskRequest { .. } => MessageType::TaskRequest,
            MessageContent::TaskResponse { .. } => MessageType::TaskResponse,
            MessageContent::StatusUpdate { .. } => MessageType::StatusUpdate,
            MessageContent::ErrorNotification { .. } => MessageType::ErrorNotification,
            MessageContent::CollaborationRequest { .. } => MessageType::CollaborationRequest,
            MessageContent::CollaborationResponse { .. } => MessageType::CollaborationResponse,
            MessageContent::ResourceRequest { .. } => MessageType::ResourceRequest,
            MessageContent::ResourceResponse { .. } => MessageType::ResourceResponse,
            MessageContent::Broadcast { .. } => MessageType::Broadcast,
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            MessageContent::CollaborationRequest { topic, .. } if topic.trim().is_empty() => {
                Err(Error::validation("Collaboration topic cannot be empty"))
            }
            MessageContent::ResourceRequest { resource_name, .. }
            | MessageContent::ResourceResponse { resource_name, .. }
                if resource_name.trim().is_empty() =>
            {
                Err(Error::validation("Resource name cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

impl AgentMessage {
    /// Create a new message with validation
    pub fn new(
        sender: AgentRole,
        recipient: AgentRole,
        content: MessageContent,
        priority: MessagePriority,
    ) -> Result<Self> {
        content.validate()?;

        Ok(Self {
            id: Uuid::new_v4(),
            sender,
            recipient,
            priority,
            content,
            created_at: Utc::now(),
            delivered_at: None,
            processed_at: None,
            response_id: None,
            correlation_id: None,
        })
    }

    /// Create a builder for constructing a message
    pub fn builder() -> AgentMessageBuilder {
        AgentMessageBuilder::new()
    }

    /// Wrap a handler result as a response travelling back to the sender
    pub fn response_to(original: &AgentMessage, result: TaskResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: original.recipient,
            recipient: original.sender,
            priority: original.priority,
            content: MessageContent::TaskResponse { result },
            created_at: Utc::now(),
            delivered_at: None,
            processed_at: None,
            response_id: None,
            correlation_id: Some(original.id),
        }
    }

    /// Report a handler failure back to the sender on behalf of the orchestrator
    pub fn error_notification(original: &AgentMessage, error: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sender: AgentRole::Orchestrator,
            recipient: original.sender,
            priority: MessagePriority::High,
            content: MessageContent::ErrorNotification {
                original_message_id: original.id,
                error: error.into(),
                timestamp: now,
            },
            created_at: now,
            delivered_at: None,
            processed_at: None,
            response_id: None,
            correlation_id: Some(original.id),
        }
    }

    pub fn message_type(&self) -> MessageType {
        self.content.message_type()
    }

    /// Stamp the delivery time; later calls keep the first stamp
    pub fn mark_delivered(&mut self) {
        if self.delivered_at.is_none() {
            self.delivered_at = Some(Utc::now());
        }
    }

    /// Stamp the processing time; later calls keep the first stamp
    pub fn mark_processed(&mut self) {
        if self.processed_at.is_none() {
            self.processed_at = Some(Utc::now());
        }
    }

    /// Record the id of the reply generated for this message
    pub fn set_response_id(&mut self, response_id: Uuid) {
        if self.response_id.is_none() {
            self.response_id = Some(response_id);
        }
    }

    pub fn is_delivered(&self) -> bool {
        self.delivered_at.is_some()
    }

    pub fn is_processed(&self) -> bool {
        self.processed_at.is_some()
    }

    /// Whether the message concerns a role as sender or recipient
    pub fn involves(&self, role: AgentRole) -> bool {
        self.sender == role || self.recipient == role
    }

    /// Get the age of the message in seconds
    pub fn age_seconds(&self) -> i64 {
        Utc::now()
            .signed_duration_since(self.created_at)
            .num_seconds()
    }

    /// Milliseconds between creation and delivery, if delivered
    pub fn delivery_time_ms(&self) -> Option<i64> {
        self.delivered_at.map(|delivered| {
            delivered
                .signed_duration_since(self.created_at)
                .num_milliseconds()
        })
    }
}

/// Builder for constructing messages with validation
#[derive(Debug, Clone, Default)]
pub struct AgentMessageBuilder {
    sender: Option<AgentRole>,
    recipient: Option<AgentRole>,
    content: Option<MessageContent>,
    priority: MessagePriority,
    correlation_id: Option<Uuid>,
}

impl AgentMessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sender(mut self, role: AgentRole) -> Self {
        self.sender = Some(role);
        self
    }

    pub fn recipient(mut self, role: AgentRole) -> Self {
        self.recipient = Some(role);
        self
    }

    pub fn content(mut self, content: MessageContent) -> Self {
        self.content = Some(content);
        self
    }

    pub fn priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn correlation_id(mut self, id: Uuid) -> Self {
        self.correlation_id = Some(id);
        self
    }

    /// Build the message
    pub fn build(self) -> Result<AgentMessage> {
        let sender = self
            .sender
            .ok_or_else(|| Error::validation("Sender role is required"))?;
        let recipient = self
            .recipient
            .ok_or_else(|| Error::validation("Recipient role is required"))?;
        let content = self
            .content
            .ok_or_else(|| Error::validation("Message content is required"))?;

        let mut message = AgentMessage::new(sender, recipient, content, self.priority)?;
        message.correlation_id = self.correlation_id;
        Ok(message)
    }
}
