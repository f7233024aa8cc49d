//! Coordinator configuration

use agent_relay_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration for the coordination runtime
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub bus: BusConfig,
    pub collaboration: CollaborationConfig,
    pub workflow: WorkflowConfig,
    pub health: HealthConfig,
    pub logging: LoggingConfig,
    /// Command-backed agents keyed by role name, registered in name order
    pub agents: BTreeMap<String, AgentCommandConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub delivery_timeout_secs: u64,
    /// Yield between queue pops
    pub delivery_pause_ms: u64,
    pub history_limit: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_secs: 300,
            delivery_pause_ms: 10,
            history_limit: 1000,
        }
    }
}

impl BusConfig {
    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_secs(self.delivery_timeout_secs)
    }

    pub fn delivery_pause(&self) -> Duration {
        Duration::from_millis(self.delivery_pause_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaborationConfig {
    pub history_limit: usize,
    pub session_ttl_secs: u64,
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self {
            history_limit: 100,
            session_ttl_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Review score below which execution is skipped
    pub min_review_score: f64,
    pub step_timeout_secs: u64,
    /// Where finished runs are written; unset disables persistence
    pub results_dir: Option<PathBuf>,
    pub history_limit: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            min_review_score: 7.0,
            step_timeout_secs: 1800,
            results_dir: None,
            history_limit: 100,
        }
    }
}

impl WorkflowConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub unresponsive_after_secs: u64,
    pub queue_warning_threshold: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            unresponsive_after_secs: 300,
            queue_warning_threshold: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// External program acting as an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentCommandConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default = "default_agent_timeout")]
    pub timeout_secs: u64,
    /// Falls back to the role's default capabilities when absent
    #[serde(default)]
    pub capabilities: Option<Vec<String>>,
}

fn default_agent_timeout() -> u64 {
    600
}

impl CoordinatorConfig {
    /// Load configuration from config files, an optional explicit file and
    /// the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name("config/local").required(false));

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("AGENT_RELAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(config_error)?;

        let config: CoordinatorConfig = settings.try_deserialize().map_err(config_error)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=10.0).contains(&self.workflow.min_review_score) {
            return Err(Error::configuration(format!(
                "workflow.min_review_score must be between 0 and 10, got {}",
                self.workflow.min_review_score
            )));
        }
        if self.workflow.step_timeout_secs == 0 {
            return Err(Error::configuration(
                "workflow.step_timeout_secs must be greater than zero",
            ));
        }
        if self.bus.delivery_timeout_secs == 0 {
            return Err(Error::configuration(
                "bus.delivery_timeout_secs must be greater than zero",
            ));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(Error::configuration(format!(
                "logging.format must be 'pretty' or 'json', got '{}'",
                self.logging.format
            )));
        }
        for (role, agent) in &self.agents {
            role.parse::<agent_relay_core::AgentRole>()
                .map_err(|_| Error::configuration(format!("Unknown agent role '{}'", role)))?;
            if agent.command.trim().is_empty() {
                return Err(Error::configuration(format!(
                    "agents.{}.command cannot be empty",
                    role
                )));
            }
        }
        Ok(())
    }
}

fn config_error(err: config::ConfigError) -> Error {
    Error::configuration(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.bus.delivery_timeout_secs, 300);
        assert_eq!(config.bus.history_limit, 1000);
        assert_eq!(config.workflow.min_review_score, 7.0);
        assert!(config.workflow.results_dir.is_none());
        assert_eq!(config.logging.format, "pretty");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_explicit_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[workflow]
min_review_score = 5.5
results_dir = "/tmp/agent-relay-results"

[bus]
delivery_pause_ms = 0

[agents.review]
command = "review-agent"
args = ["--strict"]
"#
        )
        .unwrap();

        let config = CoordinatorConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.workflow.min_review_score, 5.5);
        assert_eq!(config.workflow.step_timeout_secs, 1800);
        assert_eq!(config.bus.delivery_pause_ms, 0);
        assert_eq!(config.bus.history_limit, 1000);

        let review = &config.agents["review"];
        assert_eq!(review.command, "review-agent");
        assert_eq!(review.args, vec!["--strict"]);
        assert_eq!(review.timeout_secs, 600);
        assert!(review.capabilities.is_none());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = CoordinatorConfig::default();
        config.workflow.min_review_score = 11.0;
        assert!(config.validate().is_err());

        let mut config = CoordinatorConfig::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = CoordinatorConfig::default();
        config.agents.insert(
            "tester".to_string(),
            AgentCommandConfig {
                command: "x".to_string(),
                args: vec![],
                env: HashMap::new(),
                timeout_secs: 1,
                capabilities: None,
            },
        );
        let err = config.validate().unwrap_err();
        assert_eq!(err.category(), "configuration");
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = CoordinatorConfig::load(Some(Path::new("/nonexistent/agent-relay.toml")));
        assert!(result.unwrap_err().category() == "configuration");
    }
}
