//! Write-only persistence of finished workflow runs

use agent_relay_core::workflow::WorkflowRun;
use agent_relay_core::Result;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// File a run is written to inside the results directory
pub fn run_file_path(dir: &Path, run_id: Uuid) -> PathBuf {
    dir.join(format!("workflow_run_{}.json", run_id))
}

/// Serialize a run as pretty JSON, creating the directory if needed
pub async fn persist_run(dir: &Path, run: &WorkflowRun) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = run_file_path(dir, run.id);
    let body = serde_json::to_vec_pretty(run)?;
    tokio::fs::write(&path, body).await?;
    Ok(path)
}
