//! Agent Lifecycle States and Events
//!
//! Tracks the `Created → Running → (Stopped | Faulted)` lifecycle of each agent and
//! publishes every transition and batch outcome to an injected [`EventSink`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Agent lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Constructed, execution context not started
    Created,
    /// Execution context running and accepting tasks
    Running,
    /// Gracefully stopped
    Stopped,
    /// Execution context hit an unrecoverable error
    Faulted,
}

impl AgentState {
    /// Check if the agent can accept work
    pub fn can_work(&self) -> bool {
        matches!(self, AgentState::Running)
    }

    /// Check if the agent is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, AgentState::Stopped | AgentState::Faulted)
    }

    /// Check if `self → to` is a legal lifecycle transition
    pub fn can_transition_to(&self, to: AgentState) -> bool {
        matches!(
            (self, to),
            (AgentState::Created, AgentState::Running)
                | (AgentState::Created, AgentState::Stopped)
                | (AgentState::Created, AgentState::Faulted)
                | (AgentState::Running, AgentState::Stopped)
                | (AgentState::Running, AgentState::Faulted)
        )
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentState::Created => write!(f, "created"),
            AgentState::Running => write!(f, "running"),
            AgentState::Stopped => write!(f, "stopped"),
            AgentState::Faulted => write!(f, "faulted"),
        }
    }
}

/// Lifecycle events emitted by agents and the scheduler
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// Agent added to the scheduler
    AgentRegistered { agent: String, at: DateTime<Utc> },
    /// Agent removed from the scheduler
    AgentUnregistered { agent: String, at: DateTime<Utc> },
    /// Agent state changed
    StateChanged {
        agent: String,
        from: AgentState,
        to: AgentState,
        reason: Option<String>,
        at: DateTime<Utc>,
    },
    /// Outcome of one per-agent operation inside a batch
    AgentOutcome {
        agent: String,
        operation: String,
        round: Option<u64>,
        outcome: String,
        detail: Option<String>,
        at: DateTime<Utc>,
    },
    /// A batch operation (start-all, dispatch round, stop-all) finished
    BatchCompleted {
        operation: String,
        round: Option<u64>,
        total: usize,
        succeeded: usize,
        failed: usize,
        timed_out: usize,
        duration_ms: u64,
        at: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    pub fn state_changed(
        agent: &str,
        from: AgentState,
        to: AgentState,
        reason: Option<String>,
    ) -> Self {
        LifecycleEvent::StateChanged {
            agent: agent.to_string(),
            from,
            to,
            reason,
            at: Utc::now(),
        }
    }

    /// Agent identity the event refers to, if any
    pub fn agent(&self) -> Option<&str> {
        match self {
            LifecycleEvent::AgentRegistered { agent, .. }
            | LifecycleEvent::AgentUnregistered { agent, .. }
            | LifecycleEvent::StateChanged { agent, .. }
            | LifecycleEvent::AgentOutcome { agent, .. } => Some(agent),
            LifecycleEvent::BatchCompleted { .. } => None,
        }
    }
}

/// Diagnostics collaborator that receives every lifecycle event
pub trait EventSink: Send + Sync {
    fn emit(&self, event: LifecycleEvent);
}

/// Default sink: turns lifecycle events into structured tracing events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: LifecycleEvent) {
        match event {
            LifecycleEvent::AgentRegistered { agent, .. } => {
                info!(agent = %agent, "agent registered");
            }
            LifecycleEvent::AgentUnregistered { agent, .. } => {
                info!(agent = %agent, "agent unregistered");
            }
            LifecycleEvent::StateChanged {
                agent,
                from,
                to,
                reason,
                ..
            } => {
                if to == AgentState::Faulted {
                    warn!(
                        agent = %agent,
                        %from,
                        %to,
                        reason = reason.as_deref().unwrap_or(""),
                        "agent faulted"
                    );
                } else {
                    info!(agent = %agent, %from, %to, "agent state changed");
                }
            }
            LifecycleEvent::AgentOutcome {
                agent,
                operation,
                round,
                outcome,
                detail,
                ..
            } => match detail {
                Some(detail) => warn!(
                    agent = %agent,
                    operation = %operation,
                    round = ?round,
                    outcome = %outcome,
                    detail = %detail,
                    "agent operation did not succeed"
                ),
                None => debug!(
                    agent = %agent,
                    operation = %operation,
                    round = ?round,
                    outcome = %outcome,
                    "agent operation completed"
                ),
            },
            LifecycleEvent::BatchCompleted {
                operation,
                round,
                total,
                succeeded,
                failed,
                timed_out,
                duration_ms,
                ..
            } => {
                info!(
                    operation = %operation,
                    round = ?round,
                    total,
                    succeeded,
                    failed,
                    timed_out,
                    duration_ms,
                    "batch completed"
                );
            }
        }
    }
}

/// Sink that publishes lifecycle events to broadcast subscribers
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    event_tx: broadcast::Sender<LifecycleEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (event_tx, _) = broadcast::channel(capacity);
        Self { event_tx }
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.event_tx.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(256)
    }
}

impl EventSink for BroadcastSink {
    fn emit(&self, event: LifecycleEvent) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}
