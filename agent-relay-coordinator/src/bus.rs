//! Priority-ordered message bus between agent roles
//!
//! Messages are queued by priority (urgent first) and, within a priority,
//! in the order they were sent. A single worker task, started when the bus
//! is constructed, pops the head of the queue and hands it to the
//! recipient's [`Agent::process`](agent_relay_core::Agent::process) as a
//! `handle_message` task.
//!
//! Delivery never fails the sender:
//!
//! - an unregistered recipient drops the message with a warning;
//! - an agent error or timeout becomes an `error_notification` back to the
//!   sender;
//! - a non-empty result becomes a `task_response` back to the sender.

use crate::config::BusConfig;
use crate::registry::AgentRegistry;
use agent_relay_core::history::BoundedHistory;
use agent_relay_core::message::{AgentMessage, MessageContent, MessagePriority, MessageType};
use agent_relay_core::task::Task;
use agent_relay_core::{AgentRole, Error, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

struct Pending {
    seq: u64,
    message: AgentMessage,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    // Max-heap: higher priority first, then lower sequence number first
    fn cmp(&self, other: &Self) -> Ordering {
        self.message
            .priority
            .cmp(&other.message.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Pending messages, popped urgent-first and FIFO within a priority
#[derive(Default)]
pub struct PendingQueue {
    heap: BinaryHeap<Pending>,
    next_seq: u64,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: AgentMessage) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Pending { seq, message });
    }

    pub fn pop(&mut self) -> Option<AgentMessage> {
        self.heap.pop().map(|p| p.message)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

/// Delivery counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BusStats {
    pub sent: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
    pub responses: u64,
    pub queued: usize,
    pub history_len: usize,
}

/// Selects messages from the history
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Sender or recipient
    pub role: Option<AgentRole>,
    pub message_type: Option<MessageType>,
    pub limit: Option<usize>,
}

impl HistoryFilter {
    pub fn role(mut self, role: AgentRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn message_type(mut self, message_type: MessageType) -> Self {
        self.message_type = Some(message_type);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    fn matches(&self, message: &AgentMessage) -> bool {
        self.role.map_or(true, |role| message.involves(role))
            && self
                .message_type
                .map_or(true, |t| message.message_type() == t)
    }
}

struct BusInner {
    registry: Arc<AgentRegistry>,
    config: BusConfig,
    queue: Mutex<PendingQueue>,
    history: Mutex<BoundedHistory<AgentMessage>>,
    stats: Mutex<BusStats>,
    wakeup: Notify,
    /// Queued plus in-flight messages
    outstanding: watch::Sender<usize>,
    paused: AtomicBool,
    closed: AtomicBool,
}

/// In-process message bus with a persistent delivery worker
pub struct MessageBus {
    inner: Arc<BusInner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl MessageBus {
    /// Create the bus and spawn its delivery worker.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(registry: Arc<AgentRegistry>, config: BusConfig) -> Self {
        let (outstanding, _) = watch::channel(0usize);
        let inner = Arc::new(BusInner {
            registry,
            history: Mutex::new(BoundedHistory::new(config.history_limit)),
            config,
            queue: Mutex::new(PendingQueue::new()),
            stats: Mutex::new(BusStats::default()),
            wakeup: Notify::new(),
            outstanding,
            paused: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });

        let worker = tokio::spawn(Arc::clone(&inner).run());
        debug!("Message bus delivery worker started");

        Self {
            inner,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Queue a message and return its id; delivery happens asynchronously
    pub fn send(
        &self,
        sender: AgentRole,
        recipient: AgentRole,
        content: MessageContent,
        priority: MessagePriority,
        correlation_id: Option<Uuid>,
    ) -> Result<Uuid> {
        let mut message = AgentMessage::new(sender, recipient, content, priority)?;
        message.correlation_id = correlation_id;
        self.send_message(message)
    }

    /// Queue a prebuilt message
    pub fn send_message(&self, message: AgentMessage) -> Result<Uuid> {
        if self.inner.closed.load(AtomicOrdering::SeqCst) {
            return Err(Error::state_transition("Message bus is shut down"));
        }
        Ok(self.inner.enqueue(message))
    }

    /// Send one copy to every registered role except the sender and the
    /// excluded roles
    pub fn broadcast(
        &self,
        sender: AgentRole,
        content: MessageContent,
        priority: MessagePriority,
        exclude: &[AgentRole],
    ) -> Result<Vec<Uuid>> {
        let mut ids = Vec::new();
        for role in self.inner.registry.roles() {
            if role == sender || exclude.contains(&role) {
                continue;
            }
            ids.push(self.send(sender, role, content.clone(), priority, None)?);
        }
        debug!(sender = %sender, recipients = ids.len(), "Broadcast queued");
        Ok(ids)
    }

    /// Processed messages, newest first
    pub fn history(&self, filter: &HistoryFilter) -> Vec<AgentMessage> {
        let history = self.inner.history.lock();
        let matching = history.newest_first().filter(|m| filter.matches(m)).cloned();
        match filter.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }

    pub fn stats(&self) -> BusStats {
        let mut stats = self.inner.stats.lock().clone();
        stats.queued = self.queue_len();
        stats.history_len = self.inner.history.lock().len();
        stats
    }

    pub fn queue_len(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Wait until nothing is queued or in flight, or the bus is shut down.
    /// Does not return while the bus is paused with messages queued.
    pub async fn drain(&self) {
        let mut outstanding = self.inner.outstanding.subscribe();
        let inner = &self.inner;
        let _ = outstanding
            .wait_for(|n| *n == 0 || inner.closed.load(AtomicOrdering::SeqCst))
            .await;
    }

    /// Hold delivery; queued and new messages are kept
    pub fn pause(&self) {
        self.inner.paused.store(true, AtomicOrdering::SeqCst);
        debug!("Message bus paused");
    }

    pub fn resume(&self) {
        self.inner.paused.store(false, AtomicOrdering::SeqCst);
        self.inner.wakeup.notify_one();
        debug!("Message bus resumed");
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(AtomicOrdering::SeqCst)
    }

    /// Stop the delivery worker. Queued messages are discarded and later
    /// sends are rejected.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, AtomicOrdering::SeqCst);
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
            let discarded = std::mem::take(&mut *self.inner.queue.lock()).len();
            self.inner.outstanding.send_replace(0);
            info!(discarded, "Message bus shut down");
        }
    }
}

impl Drop for MessageBus {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.abort();
        }
    }
}

impl BusInner {
    fn enqueue(&self, message: AgentMessage) -> Uuid {
        let id = message.id;
        if self.closed.load(AtomicOrdering::SeqCst) {
            debug!(message_id = %id, "Message bus is shut down, message discarded");
            return id;
        }
        debug!(
            message_id = %id,
            sender = %message.sender,
            recipient = %message.recipient,
            message_type = %message.message_type(),
            priority = ?message.priority,
            "Message queued"
        );

        self.outstanding.send_modify(|n| *n += 1);
        self.queue.lock().push(message);
        self.stats.lock().sent += 1;
        self.wakeup.notify_one();
        id
    }

    async fn run(self: Arc<Self>) {
        loop {
            let next = if self.paused.load(AtomicOrdering::SeqCst) {
                None
            } else {
                self.queue.lock().pop()
            };

            match next {
                Some(message) => {
                    self.deliver(message).await;
                    self.outstanding.send_modify(|n| *n = n.saturating_sub(1));

                    let pause = self.config.delivery_pause();
                    if pause.is_zero() {
                        tokio::task::yield_now().await;
                    } else {
                        tokio::time::sleep(pause).await;
                    }
                }
                None => self.wakeup.notified().await,
            }
        }
    }

    async fn deliver(&self, mut message: AgentMessage) {
        let recipient = message.recipient;
        let Some(agent) = self.registry.get(recipient) else {
            warn!(
                message_id = %message.id,
                recipient = %recipient,
                "Recipient not registered, dropping message"
            );
            self.stats.lock().dropped += 1;
            return;
        };

        message.mark_delivered();
        self.registry.begin_task(recipient, "handle_message");
        debug!(
            message_id = %message.id,
            recipient = %recipient,
            message_type = %message.message_type(),
            "Delivering message"
        );

        let started = Instant::now();
        let task = Task::HandleMessage {
            message: Box::new(message.clone()),
        };
        let outcome =
            tokio::time::timeout(self.config.delivery_timeout(), agent.process(task)).await;

        let success = match outcome {
            Ok(Ok(result)) => {
                let success = result.succeeded();
                if message.message_type() == MessageType::TaskResponse {
                    if !result.is_empty() {
                        debug!(message_id = %message.id, "Result for a response discarded");
                    }
                } else if !result.is_empty() {
                    let response = AgentMessage::response_to(&message, result);
                    message.set_response_id(response.id);
                    self.stats.lock().responses += 1;
                    self.enqueue(response);
                }
                self.stats.lock().delivered += 1;
                success
            }
            Ok(Err(e)) => {
                self.report_failure(&message, e);
                false
            }
            Err(_) => {
                let e = Error::timeout(
                    format!("delivery of message {}", message.id),
                    self.config.delivery_timeout_secs,
                );
                self.report_failure(&message, e);
                false
            }
        };

        self.registry
            .finish_task(recipient, started.elapsed(), success);
        message.mark_processed();
        self.history.lock().push(message);
    }

    fn report_failure(&self, message: &AgentMessage, e: Error) {
        error!(
            message_id = %message.id,
            recipient = %message.recipient,
            error = %e,
            category = e.category(),
            "Agent failed to process message"
        );
        self.stats.lock().failed += 1;

        if message.message_type() == MessageType::ErrorNotification {
            warn!(
                message_id = %message.id,
                "Not reporting failure of an error notification"
            );
            return;
        }
        self.enqueue(AgentMessage::error_notification(message, e.to_string()));
    }
}
