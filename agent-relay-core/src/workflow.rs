//! Workflow run records
//!
//! A [`WorkflowRun`] is one pass through the fixed pipeline
//! parse → plan → create → review → execute → report. The orchestrator
//! mutates it step by step; everything a poller or the persisted JSON
//! needs is derived from it here.

use crate::role::AgentRole;
use crate::task::{TaskOutput, TaskResult};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One stage of the pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    Parse,
    Plan,
    Create,
    Review,
    Execute,
    Report,
}

impl PipelineStep {
    pub const ALL: [PipelineStep; 6] = [
        PipelineStep::Parse,
        PipelineStep::Plan,
        PipelineStep::Create,
        PipelineStep::Review,
        PipelineStep::Execute,
        PipelineStep::Report,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::Parse => "parse",
            PipelineStep::Plan => "plan",
            PipelineStep::Create => "create",
            PipelineStep::Review => "review",
            PipelineStep::Execute => "execute",
            PipelineStep::Report => "report",
        }
    }

    /// Role normally addressed for this step
    pub fn role(&self) -> AgentRole {
        match self {
            PipelineStep::Parse => AgentRole::Orchestrator,
            PipelineStep::Plan => AgentRole::Planning,
            PipelineStep::Create => AgentRole::TestCreation,
            PipelineStep::Review => AgentRole::Review,
            PipelineStep::Execute => AgentRole::Execution,
            PipelineStep::Report => AgentRole::Reporting,
        }
    }

    /// Capabilities a substitute agent must have
    pub fn required_capabilities(&self) -> &'static [&'static str] {
        match self {
            PipelineStep::Parse => &["workflow_management"],
            PipelineStep::Plan => &["test_planning"],
            PipelineStep::Create => &["code_generation"],
            PipelineStep::Review => &["code_review", "quality_assessment"],
            PipelineStep::Execute => &["test_execution"],
            PipelineStep::Report => &["report_generation"],
        }
    }

    /// Run state while this step is in flight
    pub fn state(&self) -> RunState {
        match self {
            PipelineStep::Parse => RunState::Parsing,
            PipelineStep::Plan => RunState::Planning,
            PipelineStep::Create => RunState::Creating,
            PipelineStep::Review => RunState::Reviewing,
            PipelineStep::Execute => RunState::Executing,
            PipelineStep::Report => RunState::Reporting,
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Created,
    Parsing,
    Planning,
    Creating,
    Reviewing,
    Executing,
    /// Execution was gated off by the review score
    Skipped,
    Reporting,
    Finished(RunOutcome),
}

impl RunState {
    pub fn is_finished(&self) -> bool {
        matches!(self, RunState::Finished(_))
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunState::Created => "created",
            RunState::Parsing => "parsing",
            RunState::Planning => "planning",
            RunState::Creating => "creating",
            RunState::Reviewing => "reviewing",
            RunState::Executing => "executing",
            RunState::Skipped => "skipped",
            RunState::Reporting => "reporting",
            RunState::Finished(RunOutcome::Success) => "finished(success)",
            RunState::Finished(RunOutcome::Failed) => "finished(failed)",
            RunState::Finished(RunOutcome::Cancelled) => "finished(cancelled)",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub step: PipelineStep,
    pub status: StepStatus,
    pub success: bool,
    /// Role whose agent handled the step
    pub agent: Option<AgentRole>,
    pub result: Option<TaskResult>,
    pub error: Option<String>,
    pub skip_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl StepRecord {
    /// A step whose agent returned; success is derived from the result
    pub fn completed(
        step: PipelineStep,
        agent: AgentRole,
        result: TaskResult,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            step,
            status: StepStatus::Completed,
            success: result.succeeded(),
            agent: Some(agent),
            error: result.error.clone(),
            result: Some(result),
            skip_reason: None,
            started_at,
            completed_at: Utc::now(),
        }
    }

    /// A step that raised, timed out or produced the wrong output
    pub fn failed(
        step: PipelineStep,
        agent: Option<AgentRole>,
        result: Option<TaskResult>,
        error: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            step,
            status: StepStatus::Failed,
            success: false,
            agent,
            result,
            error: Some(error.into()),
            skip_reason: None,
            started_at,
            completed_at: Utc::now(),
        }
    }

    pub fn skipped(step: PipelineStep, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            step,
            status: StepStatus::Skipped,
            success: false,
            agent: None,
            result: None,
            error: None,
            skip_reason: Some(reason.into()),
            started_at: now,
            completed_at: now,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        self.completed_at
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }

    pub fn output(&self) -> Option<&TaskOutput> {
        self.result.as_ref().map(|r| &r.output)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInputs {
    pub name: String,
    pub input_files: Vec<String>,
}

impl WorkflowInputs {
    pub fn new<S: Into<String>>(name: S, input_files: Vec<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::validation("Workflow name cannot be empty"));
        }
        if input_files.is_empty() {
            return Err(Error::validation("At least one input file is required"));
        }
        Ok(Self { name, input_files })
    }
}

/// Aggregated outcome of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub success: bool,
    pub outcome: Option<RunOutcome>,
    pub total_tests: u32,
    pub passed_tests: u32,
    pub failed_tests: u32,
    pub success_rate: f64,
    pub quality_score: Option<f64>,
    pub duration_ms: i64,
    pub deliverables: Vec<String>,
    pub failed_step: Option<PipelineStep>,
    pub error: Option<String>,
    pub execution_skipped_reason: Option<String>,
    pub steps_completed: usize,
    pub steps_total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepState {
    pub step: PipelineStep,
    pub status: StepStatus,
    pub success: bool,
}

/// Read-only snapshot for pollers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStatus {
    pub run_id: Uuid,
    pub name: String,
    pub state: RunState,
    pub elapsed_ms: i64,
    pub steps: Vec<StepState>,
    pub error: Option<String>,
    pub cancel_requested: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: Uuid,
    pub inputs: WorkflowInputs,
    pub state: RunState,
    pub steps: Vec<StepRecord>,
    pub success: bool,
    pub error: Option<String>,
    pub failed_step: Option<PipelineStep>,
    pub cancel_requested: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub summary: Option<RunSummary>,
}

impl WorkflowRun {
    pub fn new(inputs: WorkflowInputs) -> Self {
        Self {
            id: Uuid::new_v4(),
            inputs,
            state: RunState::Created,
            steps: Vec::new(),
            success: false,
            error: None,
            failed_step: None,
            cancel_requested: false,
            started_at: Utc::now(),
            finished_at: None,
            summary: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_finished()
    }

    /// Move into the in-flight state of a step
    pub fn begin(&mut self, step: PipelineStep) -> Result<()> {
        if self.is_finished() {
            return Err(Error::state_transition(format!(
                "Run {} is {} and cannot start step {}",
                self.id, self.state, step
            )));
        }
        self.state = step.state();
        Ok(())
    }

    pub fn record(&mut self, record: StepRecord) {
        if record.status == StepStatus::Skipped {
            self.state = RunState::Skipped;
        }
        if record.status == StepStatus::Failed {
            self.failed_step = Some(record.step);
            self.error = record.error.clone();
        }
        self.steps.push(record);
    }

    pub fn step(&self, step: PipelineStep) -> Option<&StepRecord> {
        self.steps.iter().find(|r| r.step == step)
    }

    /// Enter the terminal state and compute the summary.
    ///
    /// A pipeline that ran to the end with an unsuccessful step finishes as
    /// failed, naming the first such step. Returns the final outcome.
    pub fn finish(&mut self, outcome: RunOutcome) -> RunOutcome {
        if let RunState::Finished(finished) = self.state {
            return finished;
        }

        let first_unsuccessful = self
            .steps
            .iter()
            .find(|s| s.status != StepStatus::Skipped && !s.success)
            .map(|s| (s.step, s.error.clone()));
        let outcome = match (outcome, first_unsuccessful) {
            (RunOutcome::Success, Some((step, error))) => {
                if self.failed_step.is_none() {
                    self.failed_step = Some(step);
                    self.error = Some(
                        error.unwrap_or_else(|| format!("Step {} reported failure", step)),
                    );
                }
                RunOutcome::Failed
            }
            (outcome, _) => outcome,
        };

        self.state = RunState::Finished(outcome);
        self.finished_at = Some(Utc::now());
        self.success = outcome == RunOutcome::Success;
        if outcome == RunOutcome::Cancelled && self.error.is_none() {
            self.error = Some("Run cancelled".to_string());
        }
        self.summary = Some(self.summarize());
        outcome
    }

    pub fn elapsed_ms(&self) -> i64 {
        self.finished_at
            .unwrap_or_else(Utc::now)
            .signed_duration_since(self.started_at)
            .num_milliseconds()
    }

    pub fn status(&self) -> RunStatus {
        RunStatus {
            run_id: self.id,
            name: self.inputs.name.clone(),
            state: self.state,
            elapsed_ms: self.elapsed_ms(),
            steps: self
                .steps
                .iter()
                .map(|r| StepState {
                    step: r.step,
                    status: r.status,
                    success: r.success,
                })
                .collect(),
            error: self.error.clone(),
            cancel_requested: self.cancel_requested,
        }
    }

    /// Counts, quality score and deliverables pulled from the step results
    pub fn summarize(&self) -> RunSummary {
        let mut summary = RunSummary {
            run_id: self.id,
            success: self.success,
            outcome: match self.state {
                RunState::Finished(outcome) => Some(outcome),
                _ => None,
            },
            total_tests: 0,
            passed_tests: 0,
            failed_tests: 0,
            success_rate: 0.0,
            quality_score: None,
            duration_ms: self.elapsed_ms(),
            deliverables: Vec::new(),
            failed_step: self.failed_step,
            error: self.error.clone(),
            execution_skipped_reason: None,
            steps_completed: self.steps.iter().filter(|s| s.success).count(),
            steps_total: PipelineStep::ALL.len(),
        };

        for record in &self.steps {
            if record.status == StepStatus::Skipped && record.step == PipelineStep::Execute {
                summary.execution_skipped_reason = record.skip_reason.clone();
            }
            match record.output() {
                Some(TaskOutput::Tests(created)) => {
                    summary.deliverables.extend(created.test_files.iter().cloned());
                }
                Some(TaskOutput::Review(review)) => {
                    summary.quality_score = Some(review.overall_score);
                }
                Some(TaskOutput::Execution(execution)) => {
                    let s = &execution.summary;
                    summary.total_tests = s.total_tests;
                    summary.passed_tests = s.passed;
                    summary.failed_tests = s.failed;
                    summary.success_rate = if s.total_tests > 0 {
                        s.passed as f64 / s.total_tests as f64 * 100.0
                    } else {
                        s.success_rate
                    };
                    if let Some(path) = &execution.results_path {
                        summary.deliverables.push(path.clone());
                    }
                }
                Some(TaskOutput::Report(report)) => {
                    summary.deliverables.extend(report.report_paths.iter().cloned());
                }
                _ => {}
            }
        }

        summary
    }
}
