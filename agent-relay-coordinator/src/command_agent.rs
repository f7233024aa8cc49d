//! Agent backed by an external command
//!
//! The task is written to the child's stdin as JSON. The child must print a
//! [`TaskResult`] JSON object on stdout; anything before the first `{` or
//! after the last `}` is ignored.

use crate::config::AgentCommandConfig;
use agent_relay_core::agent::Agent;
use agent_relay_core::task::{Task, TaskResult};
use agent_relay_core::{AgentRole, Error, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

pub struct CommandAgent {
    role: AgentRole,
    config: AgentCommandConfig,
}

impl CommandAgent {
    pub fn new(role: AgentRole, config: AgentCommandConfig) -> Self {
        Self { role, config }
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    /// Capabilities declared in configuration, if any
    pub fn capabilities(&self) -> Option<Vec<String>> {
        self.config.capabilities.clone()
    }

    /// Extract the result object from command output
    pub fn parse_output(output: &str) -> Result<TaskResult> {
        match (output.find('{'), output.rfind('}')) {
            (Some(start), Some(end)) if start <= end => {
                let json_str = &output[start..=end];
                debug!("Parsing agent JSON: {}", json_str);
                Ok(serde_json::from_str(json_str)?)
            }
            _ => Err(Error::validation("No JSON object found in agent output")),
        }
    }
}

#[async_trait]
impl Agent for CommandAgent {
    async fn process(&self, task: Task) -> Result<TaskResult> {
        let input = serde_json::to_vec(&task)?;
        let task_type = task.task_type();

        let mut cmd = Command::new(&self.config.command);
        cmd.args(&self.config.args)
            .envs(&self.config.env)
            .env("AGENT_RELAY_ROLE", self.role.as_str())
            .env("AGENT_RELAY_TASK_TYPE", task_type)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(role = %self.role, task_type, "Executing command: {:?}", cmd);
        let mut child = cmd.spawn().map_err(|e| {
            Error::agent(
                self.role,
                format!("Failed to spawn '{}': {}", self.config.command, e),
            )
        })?;

        // Writing the task counts against the timeout
        let role = self.role;
        let exchange = async move {
            if let Some(mut stdin) = child.stdin.take() {
                if let Err(e) = stdin.write_all(&input).await {
                    // Commands may exit without reading stdin
                    if e.kind() != std::io::ErrorKind::BrokenPipe {
                        return Err(Error::agent(role, format!("Failed to write task: {}", e)));
                    }
                }
            }
            child
                .wait_with_output()
                .await
                .map_err(|e| Error::agent(role, format!("Failed to wait for command: {}", e)))
        };

        let limit = Duration::from_secs(self.config.timeout_secs);
        let output = tokio::time::timeout(limit, exchange).await.map_err(|_| {
            Error::timeout(
                format!("{} agent command", self.role),
                self.config.timeout_secs,
            )
        })??;

        info!(role = %self.role, task_type, status = %output.status, "Agent command completed");

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(role = %self.role, "Agent stderr: {}", stderr);

        if !output.status.success() {
            return Err(Error::agent(
                self.role,
                format!("Command exited with {}: {}", output.status, stderr.trim()),
            ));
        }

        Self::parse_output(&stdout).map_err(|e| Error::agent(self.role, e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_relay_core::task::TaskOutput;
    use std::collections::HashMap;

    fn shell(script: &str, timeout_secs: u64) -> CommandAgent {
        CommandAgent::new(
            AgentRole::Execution,
            AgentCommandConfig {
                command: "sh".to_string(),
                args: vec!["-c".to_string(), script.to_string()],
                env: HashMap::new(),
                timeout_secs,
                capabilities: None,
            },
        )
    }

    fn task() -> Task {
        Task::ExecuteTests {
            test_files: vec!["a.spec.ts".to_string()],
        }
    }

    #[test]
    fn test_parse_output_ignores_surrounding_text() {
        let result = CommandAgent::parse_output(
            "starting...\n{\"status\":\"failure\",\"error\":\"2 tests failed\"}\ndone",
        )
        .unwrap();
        assert!(!result.succeeded());
        assert_eq!(result.error.as_deref(), Some("2 tests failed"));

        assert!(CommandAgent::parse_output("no json here").is_err());
        assert!(CommandAgent::parse_output("} {").is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_receives_task_on_stdin() {
        let agent = shell(
            r#"input=$(cat); case "$input" in *execute_tests*) echo '{"status":"success","output":{"kind":"reply","role":"'"$AGENT_RELAY_ROLE"'"}}';; *) exit 3;; esac"#,
            10,
        );
        let result = agent.process(task()).await.unwrap();
        match result.output {
            TaskOutput::Reply(payload) => assert_eq!(payload["role"], "execution"),
            other => panic!("unexpected output {}", other.kind()),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_is_agent_error() {
        let agent = shell("echo broken >&2; exit 2", 10);
        let err = agent.process(task()).await.unwrap_err();
        assert_eq!(err.category(), "agent");
        assert!(err.to_string().contains("broken"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_command_times_out() {
        let agent = shell("sleep 5", 1);
        let err = agent.process(task()).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unread_stdin_still_times_out() {
        let agent = shell("sleep 5", 1);
        let large = Task::ExecuteTests {
            test_files: vec!["x".repeat(1 << 20)],
        };

        let started = std::time::Instant::now();
        let err = agent.process(large).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_missing_command_is_agent_error() {
        let agent = CommandAgent::new(
            AgentRole::Review,
            AgentCommandConfig {
                command: "/nonexistent/agent-relay-review".to_string(),
                args: vec![],
                env: HashMap::new(),
                timeout_secs: 1,
                capabilities: None,
            },
        );
        let err = agent.process(task()).await.unwrap_err();
        assert_eq!(err.category(), "agent");
    }
}
