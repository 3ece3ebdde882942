//! Scheduler and agent state snapshots

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coordination::AgentState;

/// Per-agent snapshot visible to the scheduler and CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub agent_id: String,
    pub state: AgentState,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    /// Tasks skipped because the dispatcher stopped waiting before they began
    #[serde(default)]
    pub tasks_discarded: u64,
    pub last_error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub last_task_at: Option<DateTime<Utc>>,
}

impl AgentSnapshot {
    pub fn new(agent_id: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            state: AgentState::Created,
            tasks_completed: 0,
            tasks_failed: 0,
            tasks_discarded: 0,
            last_error: None,
            started_at: None,
            stopped_at: None,
            last_task_at: None,
        }
    }

    pub fn tasks_attempted(&self) -> u64 {
        self.tasks_completed + self.tasks_failed
    }
}

/// Scheduler lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// Accepting registrations, agents not started yet
    Created,
    /// `start_all` has run at least once
    Running,
    /// Torn down: agents stopped and released
    ShutDown,
}

impl SchedulerState {
    pub fn accepts_registrations(&self) -> bool {
        matches!(self, SchedulerState::Created | SchedulerState::Running)
    }
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchedulerState::Created => write!(f, "created"),
            SchedulerState::Running => write!(f, "running"),
            SchedulerState::ShutDown => write!(f, "shut_down"),
        }
    }
}
