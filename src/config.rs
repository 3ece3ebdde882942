use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::coordinator::SchedulerConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub demo: DemoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Enable JSON formatted logs
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Demo run of simulated market agents
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub agent_count: usize,
    /// Agents are named `{name_prefix}{n}`, starting at 1
    pub name_prefix: String,
    /// Dispatch rounds; 0 runs until interrupted
    pub rounds: u64,
    pub round_interval_ms: u64,
    /// Agents whose market feed is down
    pub failing_agents: Vec<String>,
    pub market: String,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            agent_count: 2,
            name_prefix: "Agent#".to_string(),
            rounds: 1,
            round_interval_ms: 1_000,
            failing_agents: Vec::new(),
            market: "ETH/USD".to_string(),
        }
    }
}

impl DemoConfig {
    pub fn agent_names(&self) -> Vec<String> {
        (1..=self.agent_count)
            .map(|n| format!("{}{}", self.name_prefix, n))
            .collect()
    }

    pub fn is_failing(&self, agent: &str) -> bool {
        self.failing_agents.iter().any(|a| a == agent)
    }
}

impl AppConfig {
    /// Load configuration from a specific directory and the process environment
    pub fn load_from<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        Self::load_with(config_dir, environment())
    }

    fn load_with<P: AsRef<Path>>(config_dir: P, env: Environment) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();

        let builder = Config::builder()
            .set_default("logging.level", "info")?
            .set_default("logging.json", false)?
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Environment-specific file (e.g., config/production.toml)
            .add_source(
                File::from(config_dir.join(
                    std::env::var("LIQUID_ENV").unwrap_or_else(|_| "development".to_string()),
                ))
                .required(false),
            )
            .add_source(env);

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.scheduler.start_timeout_ms == 0 {
            errors.push("scheduler.start_timeout_ms must be positive".to_string());
        }
        if self.scheduler.stop_timeout_ms == 0 {
            errors.push("scheduler.stop_timeout_ms must be positive".to_string());
        }
        if self.scheduler.command_buffer == 0 {
            errors.push("scheduler.command_buffer must be at least 1".to_string());
        }
        if self.demo.name_prefix.is_empty() {
            errors.push("demo.name_prefix must not be empty".to_string());
        }

        let names = self.demo.agent_names();
        for failing in &self.demo.failing_agents {
            if !names.contains(failing) {
                errors.push(format!("demo.failing_agents names unknown agent {failing}"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// `LIQUID_SCHEDULER__DISPATCH_TIMEOUT_MS=500`, `LIQUID_DEMO__FAILING_AGENTS=Agent#1,Agent#2`
fn environment() -> Environment {
    Environment::with_prefix("LIQUID")
        .prefix_separator("_")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("demo.failing_agents")
        .try_parsing(true)
}
