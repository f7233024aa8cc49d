//! Workflow orchestrator: drives one run through the fixed pipeline
//!
//! Steps are strictly sequential. Each step calls the resolved agent
//! directly (not through the bus) under a timeout, and its result is
//! recorded on the run before the next step starts.
//!
//! - A raised error, timeout, missing agent or wrong output kind fails
//!   the step and finishes the run as failed.
//! - A result that reports failure without raising is recorded as an
//!   unsuccessful step; the pipeline carries on.
//! - A review score below `min_review_score` skips execution and goes
//!   straight to reporting.
//! - A cancelled run stops before its next step.

use crate::config::WorkflowConfig;
use crate::persistence;
use crate::registry::AgentRegistry;
use agent_relay_core::agent::Agent;
use agent_relay_core::history::BoundedHistory;
use agent_relay_core::task::{
    CreationOutput, ExecutionOutput, ParseOutput, PlanOutput, ReportOutput, ReviewOutput, Task,
    TaskOutput, TaskResult,
};
use agent_relay_core::workflow::{
    PipelineStep, RunOutcome, RunState, RunStatus, RunSummary, StepRecord, WorkflowInputs,
    WorkflowRun,
};
use agent_relay_core::{AgentRole, Error, Result};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// `Err` halts the pipeline with the given outcome
type StepFlow<T> = std::result::Result<T, RunOutcome>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStats {
    pub total_runs: u64,
    pub active_runs: usize,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub cancelled_runs: u64,
    pub average_duration_ms: f64,
}

#[derive(Default)]
struct Counters {
    finished: u64,
    successful: u64,
    failed: u64,
    cancelled: u64,
    total_duration_ms: i64,
}

pub struct WorkflowOrchestrator {
    registry: Arc<AgentRegistry>,
    config: WorkflowConfig,
    active: RwLock<HashMap<Uuid, WorkflowRun>>,
    finished: RwLock<BoundedHistory<WorkflowRun>>,
    counters: Mutex<Counters>,
}

impl WorkflowOrchestrator {
    pub fn new(registry: Arc<AgentRegistry>, config: WorkflowConfig) -> Self {
        Self {
            registry,
            finished: RwLock::new(BoundedHistory::new(config.history_limit)),
            config,
            active: RwLock::new(HashMap::new()),
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Create a run in the `created` state without starting it
    pub async fn create_run(&self, inputs: WorkflowInputs) -> Uuid {
        let run = WorkflowRun::new(inputs);
        let run_id = run.id;
        info!(run_id = %run_id, name = %run.inputs.name, "Workflow run created");
        self.active.write().await.insert(run_id, run);
        run_id
    }

    /// Create and execute a run, returning its summary
    pub async fn start(&self, inputs: WorkflowInputs) -> Result<RunSummary> {
        let run_id = self.create_run(inputs).await;
        self.execute(run_id).await
    }

    /// Drive a created run to completion.
    ///
    /// Step failures do not surface as `Err`; they produce a summary with
    /// `success == false`. `Err` is returned only for an unknown run or a
    /// run that was already started.
    pub async fn execute(&self, run_id: Uuid) -> Result<RunSummary> {
        let inputs = {
            let active = self.active.read().await;
            let run = active
                .get(&run_id)
                .ok_or_else(|| Error::not_found("WorkflowRun", run_id.to_string()))?;
            if run.state != RunState::Created {
                return Err(Error::state_transition(format!(
                    "Run {} has already been started ({})",
                    run_id, run.state
                )));
            }
            run.inputs.clone()
        };

        info!(
            run_id = %run_id,
            name = %inputs.name,
            input_files = inputs.input_files.len(),
            "Starting workflow run"
        );

        let outcome = match self.drive(run_id, inputs).await {
            Ok(()) => RunOutcome::Success,
            Err(outcome) => outcome,
        };
        self.finish(run_id, outcome).await
    }

    async fn drive(&self, run_id: Uuid, inputs: WorkflowInputs) -> StepFlow<()> {
        let parsed: ParseOutput = self
            .run_step(
                run_id,
                PipelineStep::Parse,
                Task::ParseFiles {
                    input_files: inputs.input_files,
                },
                |output| match output {
                    TaskOutput::Parsed(parsed) => Some(parsed.clone()),
                    _ => None,
                },
            )
            .await?;
        if !parsed.errors.is_empty() {
            warn!(run_id = %run_id, errors = parsed.errors.len(), "Some input files failed to parse");
        }

        let plan: PlanOutput = self
            .run_step(
                run_id,
                PipelineStep::Plan,
                Task::CreatePlan {
                    scenarios: parsed.scenarios(),
                },
                |output| match output {
                    TaskOutput::Plan(plan) => Some(plan.clone()),
                    _ => None,
                },
            )
            .await?;

        let created: CreationOutput = self
            .run_step(
                run_id,
                PipelineStep::Create,
                Task::GenerateTests {
                    test_scenarios: plan.test_scenarios,
                },
                |output| match output {
                    TaskOutput::Tests(created) => Some(created.clone()),
                    _ => None,
                },
            )
            .await?;

        let review: ReviewOutput = self
            .run_step(
                run_id,
                PipelineStep::Review,
                Task::ReviewCode {
                    test_files: created.test_files.clone(),
                    generated_tests: created.generated_tests,
                },
                |output| match output {
                    TaskOutput::Review(review) => Some(review.clone()),
                    _ => None,
                },
            )
            .await?;

        let min_score = self.config.min_review_score;
        let (execution, skipped_reason) = if review.overall_score >= min_score {
            let execution: ExecutionOutput = self
                .run_step(
                    run_id,
                    PipelineStep::Execute,
                    Task::ExecuteTests {
                        test_files: created.test_files,
                    },
                    |output| match output {
                        TaskOutput::Execution(execution) => Some(execution.clone()),
                        _ => None,
                    },
                )
                .await?;
            (Some(execution), None)
        } else {
            let reason = format!(
                "Review score {:.1} is below the minimum of {:.1}",
                review.overall_score, min_score
            );
            warn!(run_id = %run_id, score = review.overall_score, min_score, "Skipping test execution");
            self.update(run_id, |run| {
                run.record(StepRecord::skipped(PipelineStep::Execute, reason.clone()))
            })
            .await;
            (None, Some(reason))
        };

        let _report: ReportOutput = self
            .run_step(
                run_id,
                PipelineStep::Report,
                Task::GenerateReport {
                    review,
                    execution,
                    execution_skipped_reason: skipped_reason,
                },
                |output| match output {
                    TaskOutput::Report(report) => Some(report.clone()),
                    _ => None,
                },
            )
            .await?;

        Ok(())
    }

    /// Run one step and hand its typed output to the next one
    async fn run_step<T, F>(
        &self,
        run_id: Uuid,
        step: PipelineStep,
        task: Task,
        extract: F,
    ) -> StepFlow<T>
    where
        T: Default,
        F: Fn(&TaskOutput) -> Option<T>,
    {
        let begun = self
            .update(run_id, |run| {
                if run.cancel_requested {
                    return Err(RunOutcome::Cancelled);
                }
                run.begin(step).map_err(|_| RunOutcome::Failed)
            })
            .await;
        match begun {
            Some(Ok(())) => {}
            Some(Err(outcome)) => {
                info!(run_id = %run_id, step = %step, "Run halted before step");
                return Err(outcome);
            }
            None => return Err(RunOutcome::Failed),
        }

        let started_at = Utc::now();
        let Some((role, agent)) = self.resolve(step) else {
            let message = format!("No available agent for step {}", step);
            error!(run_id = %run_id, step = %step, "{}", message);
            self.update(run_id, |run| {
                run.record(StepRecord::failed(step, None, None, message.clone(), started_at))
            })
            .await;
            return Err(RunOutcome::Failed);
        };

        debug!(run_id = %run_id, step = %step, role = %role, "Dispatching step");
        self.registry.begin_task(role, task.task_type());
        let timer = Instant::now();
        let outcome = tokio::time::timeout(self.config.step_timeout(), agent.process(task)).await;
        let elapsed = timer.elapsed();

        let (record, flow) = match outcome {
            Ok(Ok(result)) => match Self::extract(step, &result, &extract) {
                Ok(data) => {
                    if !result.succeeded() {
                        warn!(
                            run_id = %run_id,
                            step = %step,
                            error = result.error.as_deref().unwrap_or_default(),
                            "Step reported failure"
                        );
                    }
                    self.registry.finish_task(role, elapsed, result.succeeded());
                    (
                        StepRecord::completed(step, role, result, started_at),
                        Ok(data),
                    )
                }
                Err(e) => {
                    error!(run_id = %run_id, step = %step, error = %e, "Step returned unexpected output");
                    self.registry.finish_task(role, elapsed, false);
                    (
                        StepRecord::failed(step, Some(role), Some(result), e.to_string(), started_at),
                        Err(RunOutcome::Failed),
                    )
                }
            },
            Ok(Err(e)) => {
                error!(run_id = %run_id, step = %step, role = %role, error = %e, "Step failed");
                self.registry.finish_task(role, elapsed, false);
                (
                    StepRecord::failed(step, Some(role), None, e.to_string(), started_at),
                    Err(RunOutcome::Failed),
                )
            }
            Err(_) => {
                let e = Error::timeout(format!("step {}", step), self.config.step_timeout_secs);
                error!(run_id = %run_id, step = %step, role = %role, error = %e, "Step timed out");
                self.registry.finish_task(role, elapsed, false);
                (
                    StepRecord::failed(step, Some(role), None, e.to_string(), started_at),
                    Err(RunOutcome::Failed),
                )
            }
        };

        self.update(run_id, |run| run.record(record)).await;
        flow
    }

    fn extract<T, F>(step: PipelineStep, result: &TaskResult, extract: &F) -> Result<T>
    where
        T: Default,
        F: Fn(&TaskOutput) -> Option<T>,
    {
        if let Some(data) = extract(&result.output) {
            return Ok(data);
        }
        // A failed result may carry no data at all
        if !result.succeeded() && matches!(result.output, TaskOutput::Empty) {
            return Ok(T::default());
        }
        Err(Error::validation(format!(
            "Step {} returned '{}' output",
            step,
            result.output.kind()
        )))
    }

    /// The step's own role if available, otherwise the least loaded agent
    /// with the required capabilities
    fn resolve(&self, step: PipelineStep) -> Option<(AgentRole, Arc<dyn Agent>)> {
        let role = step.role();
        if let (Some(agent), Some(status)) = (self.registry.get(role), self.registry.status(role)) {
            if status.is_available() {
                return Some((role, agent));
            }
        }

        self.registry
            .find_capable(step.required_capabilities())
            .into_iter()
            .find_map(|candidate| {
                self.registry.get(candidate).map(|agent| {
                    debug!(step = %step, role = %candidate, "Using capable substitute agent");
                    (candidate, agent)
                })
            })
    }

    async fn update<R>(&self, run_id: Uuid, f: impl FnOnce(&mut WorkflowRun) -> R) -> Option<R> {
        self.active.write().await.get_mut(&run_id).map(f)
    }

    async fn finish(&self, run_id: Uuid, outcome: RunOutcome) -> Result<RunSummary> {
        // The run moves to `finished` before the active lock is released so
        // pollers never see it missing.
        let run = {
            let mut active = self.active.write().await;
            let mut run = active
                .remove(&run_id)
                .ok_or_else(|| Error::not_found("WorkflowRun", run_id.to_string()))?;
            let outcome = run.finish(outcome);
            let summary = run.summary.clone().unwrap_or_else(|| run.summarize());

            {
                let mut counters = self.counters.lock();
                counters.finished += 1;
                counters.total_duration_ms += summary.duration_ms;
                match outcome {
                    RunOutcome::Success => counters.successful += 1,
                    RunOutcome::Cancelled => counters.cancelled += 1,
                    RunOutcome::Failed => counters.failed += 1,
                }
            }

            self.finished.write().await.push(run.clone());
            run
        };
        let summary = run.summary.clone().unwrap_or_else(|| run.summarize());

        if summary.success {
            info!(
                run_id = %run_id,
                duration_ms = summary.duration_ms,
                total_tests = summary.total_tests,
                passed_tests = summary.passed_tests,
                "Workflow run finished"
            );
        } else {
            warn!(
                run_id = %run_id,
                state = %run.state,
                failed_step = ?summary.failed_step,
                error = summary.error.as_deref().unwrap_or_default(),
                "Workflow run finished unsuccessfully"
            );
        }

        if let Some(dir) = &self.config.results_dir {
            match persistence::persist_run(dir, &run).await {
                Ok(path) => debug!(run_id = %run_id, path = %path.display(), "Workflow run saved"),
                Err(e) => error!(run_id = %run_id, error = %e, "Failed to save workflow run"),
            }
        }

        Ok(summary)
    }

    /// Request cancellation. The step in flight finishes; no further step
    /// starts. False for unknown or finished runs.
    pub async fn cancel(&self, run_id: Uuid) -> bool {
        let mut active = self.active.write().await;
        match active.get_mut(&run_id) {
            Some(run) if !run.is_finished() => {
                run.cancel_requested = true;
                info!(run_id = %run_id, state = %run.state, "Workflow run cancellation requested");
                true
            }
            _ => false,
        }
    }

    /// Snapshot for polling
    pub async fn status(&self, run_id: Uuid) -> Option<RunStatus> {
        self.run(run_id).await.map(|run| run.status())
    }

    /// Full run record, active or finished
    pub async fn run(&self, run_id: Uuid) -> Option<WorkflowRun> {
        if let Some(run) = self.active.read().await.get(&run_id) {
            return Some(run.clone());
        }
        self.finished
            .read()
            .await
            .iter()
            .find(|run| run.id == run_id)
            .cloned()
    }

    /// Active runs followed by finished runs, newest first
    pub async fn runs(&self) -> Vec<RunStatus> {
        let mut listing: Vec<RunStatus> = {
            let active = self.active.read().await;
            let mut runs: Vec<&WorkflowRun> = active.values().collect();
            runs.sort_by_key(|run| std::cmp::Reverse(run.started_at));
            runs.into_iter().map(WorkflowRun::status).collect()
        };
        listing.extend(self.finished.read().await.newest_first().map(WorkflowRun::status));
        listing
    }

    pub async fn stats(&self) -> WorkflowStats {
        let active_runs = self.active.read().await.len();
        let counters = self.counters.lock();
        WorkflowStats {
            total_runs: counters.finished + active_runs as u64,
            active_runs,
            successful_runs: counters.successful,
            failed_runs: counters.failed,
            cancelled_runs: counters.cancelled,
            average_duration_ms: if counters.finished > 0 {
                counters.total_duration_ms as f64 / counters.finished as f64
            } else {
                0.0
            },
        }
    }
}
