use thiserror::Error;

use crate::coordination::AgentState;

/// Main error type for the agent scheduler
#[derive(Error, Debug)]
pub enum SchedulerError {
    // Lifecycle errors
    #[error("Invalid state for {operation} on agent {agent}: {state}")]
    InvalidState {
        agent: String,
        state: AgentState,
        operation: &'static str,
    },

    #[error("Agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("Agent {agent} failed to start: {reason}")]
    StartFailed { agent: String, reason: String },

    // Task errors
    #[error("Task execution failed on agent {agent}: {source}")]
    TaskExecution {
        agent: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Agent {agent} timed out during {operation} after {timeout_ms}ms")]
    TimedOut {
        agent: String,
        operation: &'static str,
        timeout_ms: u64,
    },

    // Scheduler errors
    #[error("Scheduler has been shut down")]
    SchedulerShutDown,

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl SchedulerError {
    /// Agent identity the error refers to, if any
    pub fn agent(&self) -> Option<&str> {
        match self {
            SchedulerError::InvalidState { agent, .. }
            | SchedulerError::StartFailed { agent, .. }
            | SchedulerError::TaskExecution { agent, .. }
            | SchedulerError::TimedOut { agent, .. } => Some(agent),
            SchedulerError::DuplicateAgent(agent) | SchedulerError::AgentNotFound(agent) => {
                Some(agent)
            }
            _ => None,
        }
    }

    /// Short machine-readable kind, used in lifecycle events
    pub fn kind(&self) -> &'static str {
        match self {
            SchedulerError::InvalidState { .. } => "invalid_state",
            SchedulerError::DuplicateAgent(_) => "duplicate_agent",
            SchedulerError::AgentNotFound(_) => "agent_not_found",
            SchedulerError::StartFailed { .. } => "start_failed",
            SchedulerError::TaskExecution { .. } => "task_execution",
            SchedulerError::TimedOut { .. } => "timed_out",
            SchedulerError::SchedulerShutDown => "scheduler_shut_down",
            SchedulerError::Config(_) => "config",
            SchedulerError::Io(_) => "io",
            SchedulerError::Other(_) => "other",
        }
    }

    pub fn is_task_execution(&self) -> bool {
        matches!(self, SchedulerError::TaskExecution { .. })
    }

    pub fn is_invalid_state(&self) -> bool {
        matches!(self, SchedulerError::InvalidState { .. })
    }
}

/// Result type alias for SchedulerError
pub type Result<T> = std::result::Result<T, SchedulerError>;
