//! Agent traits: the capability set the scheduler drives
//!
//! `Agent` is what the scheduler sees: identity, state, and the three lifecycle
//! operations. How an agent hosts its execution context is hidden behind it.
//! `TaskExecutor` is the task logic plus its opaque api, owned by exactly one
//! agent and only ever touched from that agent's own task.

use async_trait::async_trait;
use std::sync::Arc;

use crate::coordination::{AgentState, EventSink};
use crate::coordinator::AgentSnapshot;
use crate::error::Result;

use super::context::{TaskContext, TaskOutput};

/// Schedulable unit of execution.
///
/// Implementations must be safe to drive concurrently from several batch
/// operations: every method takes `&self`.
#[async_trait]
pub trait Agent: Send + Sync + 'static {
    /// Unique, immutable identity
    fn id(&self) -> &str;

    /// Current lifecycle state
    fn state(&self) -> AgentState;

    /// Statistics and lifecycle timestamps
    async fn snapshot(&self) -> AgentSnapshot;

    /// Route this agent's lifecycle events to `events`.
    /// Called by the scheduler on registration; agents without events ignore it.
    async fn attach_event_sink(&self, _events: Arc<dyn EventSink>) {}

    /// `Created → Running`. Fails with `InvalidState` on any other state.
    async fn start(&self) -> Result<()>;

    /// Run one unit of work in the agent's execution context.
    /// Fails with `InvalidState` unless `Running`, `TaskExecution` if the task faults.
    async fn perform_task(&self) -> Result<TaskOutput>;

    /// Graceful stop. Idempotent.
    async fn stop(&self) -> Result<()>;
}

/// Task logic run inside an agent's execution context.
#[async_trait]
pub trait TaskExecutor: Send + 'static {
    /// Prepare the execution context before the agent reports `Running`
    async fn on_start(&mut self, _agent_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    /// Perform one unit of work; the returned value becomes the task payload
    async fn execute(&mut self, ctx: &TaskContext) -> anyhow::Result<Option<serde_json::Value>>;

    /// Release the execution context
    async fn on_stop(&mut self, _agent_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
