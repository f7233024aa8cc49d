//! Collaboration and shared-resource scenarios through the coordinator

mod common;

use agent_relay_core::collaboration::CollaborationStatus;
use agent_relay_core::message::{MessageContent, MessageType, Payload};
use agent_relay_core::task::{Task, TaskResult};
use agent_relay_core::{Agent, AgentRole, Result};
use agent_relay_coordinator::{Coordinator, CoordinatorConfig, DenyReason, HealthStatus};
use async_trait::async_trait;
use common::RecordingAgent;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use tokio_test::{assert_err, assert_ok};

fn coordinator() -> Coordinator {
    let mut config = CoordinatorConfig::default();
    config.bus.delivery_pause_ms = 0;
    Coordinator::new(config)
}

fn payload(key: &str, value: serde_json::Value) -> Payload {
    let mut payload = Payload::new();
    payload.insert(key.to_string(), value);
    payload
}

#[tokio::test]
async fn collaboration_request_reaches_peers_only() {
    let coordinator = coordinator();
    let planning = RecordingAgent::new();
    let review = RecordingAgent::new();
    let execution = RecordingAgent::new();
    coordinator.register_agent(AgentRole::Planning, planning.clone(), None);
    coordinator.register_agent(AgentRole::Review, review.clone(), None);
    coordinator.register_agent(AgentRole::Execution, execution.clone(), None);

    let id = assert_ok!(coordinator.collaborations().request(
        AgentRole::Planning,
        &[AgentRole::Review, AgentRole::Execution, AgentRole::Planning],
        "flaky selector",
        payload("selector", json!("#submit")),
    ));
    coordinator.bus().drain().await;

    assert!(planning.received().is_empty());
    for peer in [&review, &execution] {
        let requests = peer.received_of(MessageType::CollaborationRequest);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].correlation_id, Some(id));
        match &requests[0].content {
            MessageContent::CollaborationRequest {
                collaboration_id,
                participants,
                ..
            } => {
                assert_eq!(*collaboration_id, id);
                assert_eq!(participants[0], AgentRole::Planning);
                assert_eq!(participants.len(), 3);
            }
            other => panic!("unexpected content {:?}", other.message_type()),
        }
    }

    assert!(coordinator
        .collaborations()
        .respond(id, AgentRole::Review, payload("fix", json!("use data-testid"))));
    assert!(!coordinator
        .collaborations()
        .respond(id, AgentRole::Reporting, Payload::new()));
    assert!(coordinator
        .collaborations()
        .complete(id, payload("resolved", json!(true))));
    assert!(!coordinator.collaborations().complete(id, Payload::new()));

    let session = coordinator.collaborations().get(id).unwrap();
    assert_eq!(session.status, CollaborationStatus::Completed);
    assert_eq!(session.messages.len(), 3);
    assert!(session.closed_at.is_some());

    let metrics = coordinator.metrics();
    assert_eq!(metrics.collaborations.successful, 1);
    assert_eq!(metrics.collaborations.active, 0);
    assert_eq!(metrics.collaborations.success_rate, 100.0);
    assert_eq!(metrics.messages.delivered, 2);
}

/// Answers every collaboration request as soon as it is delivered
struct RespondingPeer {
    role: AgentRole,
    coordinator: OnceLock<Weak<Coordinator>>,
    accepted: AtomicUsize,
    rejected: AtomicUsize,
}

impl RespondingPeer {
    fn new(role: AgentRole) -> Arc<Self> {
        Arc::new(Self {
            role,
            coordinator: OnceLock::new(),
            accepted: AtomicUsize::new(0),
            rejected: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Agent for RespondingPeer {
    async fn process(&self, task: Task) -> Result<TaskResult> {
        if let Task::HandleMessage { message } = task {
            if let MessageContent::CollaborationRequest { collaboration_id, .. } = &message.content {
                let recorded = self
                    .coordinator
                    .get()
                    .and_then(Weak::upgrade)
                    .map(|c| {
                        c.collaborations()
                            .respond(*collaboration_id, self.role, Payload::new())
                    })
                    .unwrap_or(false);
                let counter = if recorded { &self.accepted } else { &self.rejected };
                counter.fetch_add(1, Ordering::SeqCst);
            }
        }
        Ok(TaskResult::default())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn immediate_responses_are_recorded() {
    let coordinator = Arc::new(coordinator());
    let peers: Vec<_> = [AgentRole::Review, AgentRole::Execution, AgentRole::TestCreation]
        .into_iter()
        .map(|role| {
            let peer = RespondingPeer::new(role);
            let _ = peer.coordinator.set(Arc::downgrade(&coordinator));
            coordinator.register_agent(role, peer.clone(), None);
            peer
        })
        .collect();
    let roles: Vec<AgentRole> = peers.iter().map(|p| p.role).collect();

    let mut ids = Vec::new();
    for n in 0..100 {
        ids.push(assert_ok!(coordinator.collaborations().request(
            AgentRole::Planning,
            &roles,
            format!("topic {}", n),
            Payload::new(),
        )));
    }
    coordinator.bus().drain().await;

    for peer in &peers {
        assert_eq!(peer.rejected.load(Ordering::SeqCst), 0);
        assert_eq!(peer.accepted.load(Ordering::SeqCst), 100);
    }
    for id in ids {
        let session = coordinator.collaborations().get(id).unwrap();
        assert_eq!(session.messages.len(), 6);
        assert_eq!(
            session
                .messages
                .iter()
                .filter(|m| m.message_type() == MessageType::CollaborationResponse)
                .count(),
            3
        );
    }
}

#[tokio::test]
async fn invalid_collaboration_requests_are_rejected() {
    let coordinator = coordinator();
    let collaborations = coordinator.collaborations();

    assert_err!(collaborations.request(AgentRole::Planning, &[AgentRole::Review], "  ", Payload::new()));
    assert_err!(collaborations.request(AgentRole::Planning, &[], "topic", Payload::new()));
    assert_err!(collaborations.request(
        AgentRole::Planning,
        &[AgentRole::Planning],
        "topic",
        Payload::new()
    ));
    assert_eq!(collaborations.stats().active, 0);
    assert_eq!(coordinator.bus().stats().sent, 0);
}

#[tokio::test]
async fn failed_collaborations_count_against_success_rate() {
    let coordinator = coordinator();
    coordinator.bus().pause();
    let collaborations = coordinator.collaborations();

    let ok = assert_ok!(collaborations.request(AgentRole::Planning, &[AgentRole::Review], "a", Payload::new()));
    let bad = assert_ok!(collaborations.request(AgentRole::Review, &[AgentRole::Execution], "b", Payload::new()));
    assert_eq!(collaborations.active().len(), 2);

    assert!(collaborations.complete(ok, Payload::new()));
    assert!(collaborations.fail(bad, "peer went away"));

    let stats = collaborations.stats();
    assert_eq!(stats.successful, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.success_rate, 50.0);

    let history = collaborations.history(10);
    assert_eq!(history[0].id, bad);
    assert_eq!(
        history[0].status,
        CollaborationStatus::Failed {
            reason: "peer went away".to_string()
        }
    );
}

#[tokio::test]
async fn exclusive_lock_blocks_other_roles_until_released() {
    let coordinator = coordinator();
    let resources = coordinator.resources();

    resources.add("cache", vec![1u32, 2, 3]);
    resources.add("cache", vec![4u32, 5]);
    assert_eq!(resources.names(), vec!["cache"]);

    let grant = resources.request(AgentRole::Execution, "cache", true);
    assert!(grant.is_granted());
    assert_eq!(*grant.downcast::<Vec<u32>>().unwrap(), vec![4, 5]);
    assert_eq!(resources.holder("cache"), Some(AgentRole::Execution));

    let denied = resources.request(AgentRole::Review, "cache", true);
    assert_eq!(denied.deny_reason(), Some(DenyReason::LockedBy(AgentRole::Execution)));
    assert!(!resources.request(AgentRole::Review, "cache", false).is_granted());
    assert!(resources.request(AgentRole::Execution, "cache", false).is_granted());

    assert!(!resources.release(AgentRole::Review, "cache"));
    assert!(resources.release(AgentRole::Execution, "cache"));
    assert!(resources.request(AgentRole::Review, "cache", true).is_granted());
    assert_eq!(resources.holder("cache"), Some(AgentRole::Review));

    assert_eq!(
        resources.request(AgentRole::Review, "missing", false).deny_reason(),
        Some(DenyReason::NotFound)
    );
}

#[tokio::test]
async fn shared_resource_is_visible_across_roles() {
    let coordinator = Arc::new(coordinator());
    coordinator
        .resources()
        .add("parsed_files", vec!["checkout.md".to_string()]);

    let handles: Vec<_> = [AgentRole::Planning, AgentRole::Review, AgentRole::Execution]
        .into_iter()
        .map(|role| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .resources()
                    .request(role, "parsed_files", false)
                    .downcast::<Vec<String>>()
                    .map(|files| files.len())
            })
        })
        .collect();

    for handle in futures::future::join_all(handles).await {
        assert_eq!(handle.unwrap(), Some(1));
    }
}

#[tokio::test]
async fn health_reflects_registered_agents() {
    let coordinator = coordinator();
    coordinator.register_agent(AgentRole::Planning, RecordingAgent::new(), None);
    coordinator.register_agent(AgentRole::Review, RecordingAgent::new(), None);
    coordinator.registry().unregister(AgentRole::Review);

    let report = coordinator.health_check();
    assert_eq!(report.status, HealthStatus::Healthy);
    assert_eq!(report.agents.len(), 1);

    let metrics = coordinator.metrics();
    assert_eq!(metrics.agents.len(), 2);
    coordinator.shutdown();
}
