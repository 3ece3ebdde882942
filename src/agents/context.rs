//! TaskContext: what a task executor sees for one unit of work

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Context given to the executor for each dispatched task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    pub agent_id: String,
    pub task_id: Uuid,
    /// 1-based count of tasks this agent has been asked to perform
    pub sequence: u64,
    pub dispatched_at: DateTime<Utc>,
}

impl TaskContext {
    pub fn new(agent_id: &str, sequence: u64) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            task_id: Uuid::new_v4(),
            sequence,
            dispatched_at: Utc::now(),
        }
    }
}

/// Successful result of one task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutput {
    pub task_id: Uuid,
    pub sequence: u64,
    /// Executor-defined payload (e.g. the decision a market agent took)
    pub payload: Option<serde_json::Value>,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl TaskOutput {
    pub fn new(ctx: &TaskContext, payload: Option<serde_json::Value>, duration_ms: u64) -> Self {
        Self {
            task_id: ctx.task_id,
            sequence: ctx.sequence,
            payload,
            duration_ms,
            completed_at: Utc::now(),
        }
    }
}
