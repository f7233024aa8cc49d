//! Task and result payloads exchanged with agents
//!
//! A [`Task`] is what an agent is asked to do, discriminated by
//! `task_type`. A [`TaskResult`] carries a status, an optional error and a
//! typed [`TaskOutput`] the orchestrator reads step data from.

use crate::message::{AgentMessage, Payload};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unit of work handed to an agent's `process`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "task_type", rename_all = "snake_case")]
pub enum Task {
    ParseFiles {
        input_files: Vec<String>,
    },
    CreatePlan {
        scenarios: Vec<Value>,
    },
    GenerateTests {
        test_scenarios: Vec<Value>,
    },
    ReviewCode {
        test_files: Vec<String>,
        generated_tests: Vec<Value>,
    },
    ExecuteTests {
        test_files: Vec<String>,
    },
    GenerateReport {
        review: ReviewOutput,
        execution: Option<ExecutionOutput>,
        execution_skipped_reason: Option<String>,
    },
    HandleMessage {
        message: Box<AgentMessage>,
    },
}

impl Task {
    /// The `task_type` discriminator, also used as the status label
    pub fn task_type(&self) -> &'static str {
        match self {
            Task::ParseFiles { .. } => "parse_files",
            Task::CreatePlan { .. } => "create_plan",
            Task::GenerateTests { .. } => "generate_tests",
            Task::ReviewCode { .. } => "review_code",
            Task::ExecuteTests { .. } => "execute_tests",
            Task::GenerateReport { .. } => "generate_report",
            Task::HandleMessage { .. } => "handle_message",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    #[default]
    Success,
    Failure,
}

/// Outcome of one `process` call
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskResult {
    #[serde(default)]
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub output: TaskOutput,
}

impl TaskResult {
    pub fn success(output: TaskOutput) -> Self {
        Self {
            status: ResultStatus::Success,
            error: None,
            output,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Failure,
            error: Some(error.into()),
            output: TaskOutput::Empty,
        }
    }

    /// Success is a success status with no error text
    pub fn succeeded(&self) -> bool {
        self.status == ResultStatus::Success && self.error.as_deref().map_or(true, str::is_empty)
    }

    /// Nothing worth replying with
    pub fn is_empty(&self) -> bool {
        self.status == ResultStatus::Success
            && self.error.is_none()
            && matches!(self.output, TaskOutput::Empty)
    }
}

/// Step-specific result data
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskOutput {
    #[default]
    Empty,
    Parsed(ParseOutput),
    Plan(PlanOutput),
    Tests(CreationOutput),
    Review(ReviewOutput),
    Execution(ExecutionOutput),
    Report(ReportOutput),
    Reply(Payload),
}

impl TaskOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            TaskOutput::Empty => "empty",
            TaskOutput::Parsed(_) => "parsed",
            TaskOutput::Plan(_) => "plan",
            TaskOutput::Tests(_) => "tests",
            TaskOutput::Review(_) => "review",
            TaskOutput::Execution(_) => "execution",
            TaskOutput::Report(_) => "report",
            TaskOutput::Reply(_) => "reply",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParsedFile {
    pub path: String,
    #[serde(default)]
    pub scenarios: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ParseOutput {
    #[serde(default)]
    pub parsed_files: Vec<ParsedFile>,
    #[serde(default)]
    pub errors: Vec<String>,
}

impl ParseOutput {
    /// Every scenario across all parsed files, in file order
    pub fn scenarios(&self) -> Vec<Value> {
        self.parsed_files
            .iter()
            .flat_map(|file| file.scenarios.iter().cloned())
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PlanOutput {
    #[serde(default)]
    pub test_scenarios: Vec<Value>,
    #[serde(default)]
    pub details: Payload,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CreationOutput {
    #[serde(default)]
    pub test_files: Vec<String>,
    #[serde(default)]
    pub generated_tests: Vec<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReviewOutput {
    pub overall_score: f64,
    #[serde(default)]
    pub issues: Vec<Value>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionSummary {
    pub total_tests: u32,
    pub passed: u32,
    pub failed: u32,
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default)]
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ExecutionOutput {
    pub summary: ExecutionSummary,
    #[serde(default)]
    pub results_path: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReportOutput {
    #[serde(default)]
    pub report_paths: Vec<String>,
}
