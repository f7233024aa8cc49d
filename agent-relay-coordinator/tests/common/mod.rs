//! Scripted in-memory agents shared by the integration tests

#![allow(dead_code)]

use agent_relay_core::message::{AgentMessage, MessageType, Payload};
use agent_relay_core::task::{
    CreationOutput, ExecutionOutput, ExecutionSummary, ParseOutput, ParsedFile, PlanOutput,
    ReportOutput, ReviewOutput, Task, TaskOutput, TaskResult,
};
use agent_relay_core::{Agent, AgentRole, Error, Result};
use agent_relay_coordinator::AgentRegistry;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Records every message it is handed; replies to each one when asked
#[derive(Default)]
pub struct RecordingAgent {
    pub received: Mutex<Vec<AgentMessage>>,
    pub reply: bool,
}

impl RecordingAgent {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn replying() -> Arc<Self> {
        Arc::new(Self {
            received: Mutex::new(Vec::new()),
            reply: true,
        })
    }

    pub fn received(&self) -> Vec<AgentMessage> {
        self.received.lock().clone()
    }

    pub fn received_of(&self, message_type: MessageType) -> Vec<AgentMessage> {
        self.received()
            .into_iter()
            .filter(|m| m.message_type() == message_type)
            .collect()
    }
}

#[async_trait]
impl Agent for RecordingAgent {
    async fn process(&self, task: Task) -> Result<TaskResult> {
        let Task::HandleMessage { message } = task else {
            return Err(Error::validation("RecordingAgent only handles messages"));
        };
        self.received.lock().push(*message);

        if self.reply {
            let mut payload = Payload::new();
            payload.insert("ack".to_string(), json!(true));
            return Ok(TaskResult::success(TaskOutput::Reply(payload)));
        }
        Ok(TaskResult::default())
    }
}

/// Always raises
pub struct FailingAgent {
    pub role: AgentRole,
    pub calls: AtomicUsize,
}

impl FailingAgent {
    pub fn new(role: AgentRole) -> Arc<Self> {
        Arc::new(Self {
            role,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Agent for FailingAgent {
    async fn process(&self, _task: Task) -> Result<TaskResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(Error::agent(self.role, "scripted failure"))
    }
}

/// Returns a fixed result after an optional delay, counting calls
pub struct ScriptedAgent {
    pub result: TaskResult,
    pub delay: Duration,
    pub calls: AtomicUsize,
    pub tasks: Mutex<Vec<Task>>,
}

impl ScriptedAgent {
    pub fn new(result: TaskResult) -> Arc<Self> {
        Self::delayed(result, Duration::ZERO)
    }

    pub fn delayed(result: TaskResult, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            result,
            delay,
            calls: AtomicUsize::new(0),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_task(&self) -> Option<Task> {
        self.tasks.lock().last().cloned()
    }
}

#[async_trait]
impl Agent for ScriptedAgent {
    async fn process(&self, task: Task) -> Result<TaskResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tasks.lock().push(task);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.result.clone())
    }
}

/// One scripted agent per pipeline role
pub struct Pipeline {
    pub parse: Arc<ScriptedAgent>,
    pub plan: Arc<ScriptedAgent>,
    pub create: Arc<ScriptedAgent>,
    pub review: Arc<ScriptedAgent>,
    pub execute: Arc<ScriptedAgent>,
    pub report: Arc<ScriptedAgent>,
}

impl Pipeline {
    pub fn with_review_score(score: f64) -> Self {
        Self {
            parse: ScriptedAgent::new(TaskResult::success(TaskOutput::Parsed(ParseOutput {
                parsed_files: vec![ParsedFile {
                    path: "checkout.md".to_string(),
                    scenarios: vec![json!({"name": "guest checkout"}), json!({"name": "coupon"})],
                }],
                errors: vec![],
            }))),
            plan: ScriptedAgent::new(TaskResult::success(TaskOutput::Plan(PlanOutput {
                test_scenarios: vec![json!({"name": "guest checkout"}), json!({"name": "coupon"})],
                details: Payload::new(),
            }))),
            create: ScriptedAgent::new(TaskResult::success(TaskOutput::Tests(CreationOutput {
                test_files: vec![
                    "tests/guest_checkout.spec.ts".to_string(),
                    "tests/coupon.spec.ts".to_string(),
                ],
                generated_tests: vec![json!("guest checkout"), json!("coupon")],
            }))),
            review: ScriptedAgent::new(TaskResult::success(TaskOutput::Review(ReviewOutput {
                overall_score: score,
                issues: vec![],
                recommendations: vec!["prefer role selectors".to_string()],
            }))),
            execute: ScriptedAgent::new(TaskResult::success(TaskOutput::Execution(
                ExecutionOutput {
                    summary: ExecutionSummary {
                        total_tests: 10,
                        passed: 8,
                        failed: 2,
                        success_rate: 80.0,
                        execution_time_ms: 5400,
                    },
                    results_path: Some("results/run.json".to_string()),
                },
            ))),
            report: ScriptedAgent::new(TaskResult::success(TaskOutput::Report(ReportOutput {
                report_paths: vec!["reports/index.html".to_string()],
            }))),
        }
    }

    pub fn register(&self, registry: &AgentRegistry) {
        registry.register(AgentRole::Orchestrator, self.parse.clone(), None);
        registry.register(AgentRole::Planning, self.plan.clone(), None);
        registry.register(AgentRole::TestCreation, self.create.clone(), None);
        registry.register(AgentRole::Review, self.review.clone(), None);
        registry.register(AgentRole::Execution, self.execute.clone(), None);
        registry.register(AgentRole::Reporting, self.report.clone(), None);
    }

    pub fn registry(&self) -> Arc<AgentRegistry> {
        let registry = Arc::new(AgentRegistry::new());
        self.register(&registry);
        registry
    }
}
