//! Batch reports: per-agent outcomes of one batch operation

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

use crate::agents::TaskOutput;
use crate::error::SchedulerError;

/// Batch operation a report belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOperation {
    StartAll,
    Dispatch,
    StopAll,
    Shutdown,
}

impl BatchOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchOperation::StartAll => "start_all",
            BatchOperation::Dispatch => "dispatch",
            BatchOperation::StopAll => "stop_all",
            BatchOperation::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for BatchOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one agent's operation
#[derive(Debug)]
pub enum AgentOutcome {
    Started,
    Success(TaskOutput),
    Stopped,
    Failed(SchedulerError),
    /// No result before the deadline; the operation was not aborted
    TimedOut,
}

impl AgentOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            AgentOutcome::Started | AgentOutcome::Success(_) | AgentOutcome::Stopped
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, AgentOutcome::Failed(_))
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, AgentOutcome::TimedOut)
    }

    pub fn label(&self) -> &'static str {
        match self {
            AgentOutcome::Started => "started",
            AgentOutcome::Success(_) => "success",
            AgentOutcome::Stopped => "stopped",
            AgentOutcome::Failed(_) => "failed",
            AgentOutcome::TimedOut => "timed_out",
        }
    }

    pub fn error(&self) -> Option<&SchedulerError> {
        match self {
            AgentOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }

    pub fn output(&self) -> Option<&TaskOutput> {
        match self {
            AgentOutcome::Success(output) => Some(output),
            _ => None,
        }
    }
}

/// One agent's entry in a report
#[derive(Debug)]
pub struct AgentReport {
    pub agent: String,
    pub outcome: AgentOutcome,
}

/// Overall shape of a report, for caller retry decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// No agents were part of the batch
    Empty,
    AllSucceeded,
    PartiallySucceeded,
    NoneSucceeded,
}

/// Per-agent outcomes of one batch, in registration order
#[derive(Debug)]
pub struct BatchReport {
    pub operation: BatchOperation,
    /// Dispatch round number; `None` for lifecycle batches
    pub round: Option<u64>,
    pub entries: Vec<AgentReport>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl BatchReport {
    pub fn empty(operation: BatchOperation, round: Option<u64>) -> Self {
        Self {
            operation,
            round,
            entries: Vec::new(),
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Outcome for one agent identity
    pub fn get(&self, agent: &str) -> Option<&AgentOutcome> {
        self.entries
            .iter()
            .find(|e| e.agent == agent)
            .map(|e| &e.outcome)
    }

    /// Agent identities in report order
    pub fn agents(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.agent.as_str()).collect()
    }

    pub fn succeeded(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_failure()).count()
    }

    pub fn timed_out(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.outcome.is_timed_out())
            .count()
    }

    pub fn status(&self) -> BatchStatus {
        let succeeded = self.succeeded();
        if self.entries.is_empty() {
            BatchStatus::Empty
        } else if succeeded == self.entries.len() {
            BatchStatus::AllSucceeded
        } else if succeeded == 0 {
            BatchStatus::NoneSucceeded
        } else {
            BatchStatus::PartiallySucceeded
        }
    }

    /// Identities that did not succeed, with reasons
    pub fn failures(&self) -> HashMap<&str, String> {
        self.entries
            .iter()
            .filter(|e| !e.outcome.is_success())
            .map(|e| {
                let reason = match &e.outcome {
                    AgentOutcome::Failed(err) => err.to_string(),
                    other => other.label().to_string(),
                };
                (e.agent.as_str(), reason)
            })
            .collect()
    }

    /// Serializable view for printing and logging
    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            operation: self.operation,
            round: self.round,
            status: self.status(),
            total: self.len(),
            succeeded: self.succeeded(),
            failed: self.failed(),
            timed_out: self.timed_out(),
            started_at: self.started_at,
            duration_ms: self.duration_ms,
            entries: self
                .entries
                .iter()
                .map(|e| OutcomeSummary {
                    agent: e.agent.clone(),
                    outcome: e.outcome.label(),
                    error: e.outcome.error().map(|err| err.to_string()),
                    payload: e.outcome.output().and_then(|o| o.payload.clone()),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OutcomeSummary {
    pub agent: String,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub operation: BatchOperation,
    pub round: Option<u64>,
    pub status: BatchStatus,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub entries: Vec<OutcomeSummary>,
}
