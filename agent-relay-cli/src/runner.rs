//! One-shot pipeline run over command-backed agents

use agent_relay_core::workflow::{RunSummary, WorkflowInputs};
use agent_relay_coordinator::{Coordinator, CoordinatorConfig};
use anyhow::bail;
use tracing::info;

/// Register the configured agents, run the pipeline once and shut down.
///
/// A pipeline that finishes unsuccessfully still returns `Ok`; callers read
/// `summary.success`.
pub async fn run_pipeline(
    config: CoordinatorConfig,
    name: &str,
    input_files: Vec<String>,
) -> anyhow::Result<RunSummary> {
    let inputs = WorkflowInputs::new(name, input_files)?;

    let coordinator = Coordinator::new(config);
    let roles = coordinator.register_command_agents()?;
    if roles.is_empty() {
        bail!("No agents configured; add an [agents.<role>] section to the configuration");
    }
    info!(agents = roles.len(), "Registered command agents");

    let summary = coordinator.orchestrator().start(inputs).await?;
    coordinator.shutdown();
    Ok(summary)
}
